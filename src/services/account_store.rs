use crate::error::Result;
use crate::models::{LinkedAccount, Provider};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Persistence of linked provider accounts, keyed by `(user_id, provider)`.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, user_id: Uuid, provider: Provider) -> Result<Option<LinkedAccount>>;

    /// Insert or replace the account for its `(user_id, provider)` key.
    async fn save_account(&self, account: &LinkedAccount) -> Result<()>;
}

pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get_account(&self, user_id: Uuid, provider: Provider) -> Result<Option<LinkedAccount>> {
        let account = sqlx::query_as::<_, LinkedAccount>(
            r#"
            SELECT user_id, provider, access_token, refresh_token, expires_at
            FROM linked_accounts
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    async fn save_account(&self, account: &LinkedAccount) -> Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO linked_accounts (user_id, provider, access_token, refresh_token, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (user_id, provider) DO UPDATE
            SET access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(account.user_id)
        .bind(account.provider)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// HashMap-backed store for tests.
    #[derive(Default)]
    pub struct MemoryAccountStore {
        accounts: Mutex<HashMap<(Uuid, Provider), LinkedAccount>>,
        saves: Mutex<usize>,
    }

    impl MemoryAccountStore {
        pub fn with_accounts(accounts: impl IntoIterator<Item = LinkedAccount>) -> Self {
            let store = Self::default();
            {
                let mut map = store.accounts.lock().unwrap();
                for account in accounts {
                    map.insert((account.user_id, account.provider), account);
                }
            }
            store
        }

        pub fn save_count(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    #[async_trait]
    impl AccountStore for MemoryAccountStore {
        async fn get_account(
            &self,
            user_id: Uuid,
            provider: Provider,
        ) -> Result<Option<LinkedAccount>> {
            Ok(self.accounts.lock().unwrap().get(&(user_id, provider)).cloned())
        }

        async fn save_account(&self, account: &LinkedAccount) -> Result<()> {
            *self.saves.lock().unwrap() += 1;
            self.accounts
                .lock()
                .unwrap()
                .insert((account.user_id, account.provider), account.clone());
            Ok(())
        }
    }
}
