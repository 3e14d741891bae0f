use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use crate::config::SchedulerConfig;
use crate::core::{AccountContext, AccountResolver, Credentials};

/// `accounts.json` 中的一个账号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountsDocument {
    #[serde(default)]
    accounts: Vec<AccountRecord>,
    #[serde(default)]
    current_account: Option<String>,
}

/// 提供账号的凭证
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, account_id: &str) -> Option<Credentials>;
}

/// 读取 `<dir>/<account_id>.token`，每个文件一个访问令牌
#[derive(Debug, Clone)]
pub struct TokenFileCredentials {
    dir: PathBuf,
}

impl TokenFileCredentials {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn token_path(&self, account_id: &str) -> Option<PathBuf> {
        // 账号 id 会作为文件名
        if account_id.is_empty() || account_id.contains(['/', '\\']) || account_id.starts_with('.') {
            return None;
        }
        Some(self.dir.join(format!("{}.token", account_id)))
    }
}

#[async_trait]
impl CredentialProvider for TokenFileCredentials {
    async fn credentials(&self, account_id: &str) -> Option<Credentials> {
        let path = self.token_path(account_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(token) => {
                let token = token.trim();
                if token.is_empty() {
                    warn!("Empty token file {}", path.display());
                    None
                } else {
                    Some(Credentials::new(token))
                }
            }
            Err(err) => {
                debug!("No token for {}: {}", account_id, err);
                None
            }
        }
    }
}

/// 应用已知的账号，来自 `accounts.json`
pub struct AccountDirectory {
    accounts: Vec<AccountRecord>,
    current_account: Option<String>,
    credentials: Arc<dyn CredentialProvider>,
}

impl AccountDirectory {
    pub fn new(accounts: Vec<AccountRecord>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            accounts,
            current_account: None,
            credentials,
        }
    }

    /// 从配置读取账号文件和令牌目录，账号文件缺失或无法读取时为空
    pub async fn load(config: &SchedulerConfig) -> Self {
        let credentials = Arc::new(TokenFileCredentials::new(config.tokens_path()));
        Self::from_file(&config.accounts_path(), credentials).await
    }

    pub async fn from_file(path: &Path, credentials: Arc<dyn CredentialProvider>) -> Self {
        let document = match tokio::fs::read_to_string(path).await {
            Ok(data) => match serde_json::from_str::<AccountsDocument>(&data) {
                Ok(document) => {
                    info!("Loaded {} accounts", document.accounts.len());
                    document
                }
                Err(err) => {
                    error!("Failed to parse accounts {}: {}", path.display(), err);
                    AccountsDocument::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No accounts file found, starting with empty accounts list");
                AccountsDocument::default()
            }
            Err(err) => {
                error!("Failed to read accounts {}: {}", path.display(), err);
                AccountsDocument::default()
            }
        };

        Self {
            accounts: document.accounts,
            current_account: document.current_account,
            credentials,
        }
    }

    pub fn accounts(&self) -> &[AccountRecord] {
        &self.accounts
    }

    pub fn get(&self, account_id: &str) -> Option<&AccountRecord> {
        self.accounts.iter().find(|account| account.id == account_id)
    }

    /// 当前选中的账号，未选中时取第一个
    pub fn current_account(&self) -> Option<&AccountRecord> {
        self.current_account
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| self.accounts.first())
    }
}

#[async_trait]
impl AccountResolver for AccountDirectory {
    async fn resolve(&self, account_id: &str) -> Option<AccountContext> {
        let record = self.get(account_id)?;
        let Some(credentials) = self.credentials.credentials(account_id).await else {
            warn!("Account {} has no credentials", account_id);
            return None;
        };

        Some(AccountContext {
            account_id: record.id.clone(),
            name: record.name.clone(),
            credentials,
        })
    }
}

/// 固定的内存账号集合
#[derive(Debug, Default, Clone)]
pub struct StaticAccounts {
    accounts: HashMap<String, AccountContext>,
}

impl StaticAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account_id: &str, name: &str, token: &str) -> Self {
        self.insert(AccountContext {
            account_id: account_id.to_string(),
            name: name.to_string(),
            credentials: Credentials::new(token),
        });
        self
    }

    pub fn insert(&mut self, account: AccountContext) {
        self.accounts.insert(account.account_id.clone(), account);
    }
}

#[async_trait]
impl AccountResolver for StaticAccounts {
    async fn resolve(&self, account_id: &str) -> Option<AccountContext> {
        self.accounts.get(account_id).cloned()
    }
}
