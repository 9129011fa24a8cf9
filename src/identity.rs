use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::IdentityError;
use crate::random::SharedRng;

/// Pool of user-agent strings handed out at random, one per detail request.
pub struct IdentityProvider {
    pool: Vec<String>,
    rng: Arc<SharedRng>,
}

impl IdentityProvider {
    pub fn new(pool: Vec<String>, rng: Arc<SharedRng>) -> Self {
        Self { pool, rng }
    }

    /// Reads one identity per line, skipping blanks. An empty file is fatal.
    pub async fn load(path: impl AsRef<Path>, rng: Arc<SharedRng>) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let pool: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if pool.is_empty() {
            return Err(IdentityError::EmptyPool.into());
        }

        info!(count = pool.len(), path = %path.as_ref().display(), "Loaded identity pool");
        Ok(Self::new(pool, rng))
    }

    pub fn random(&self) -> Result<String, IdentityError> {
        if self.pool.is_empty() {
            return Err(IdentityError::EmptyPool);
        }
        Ok(self.pool[self.rng.index(self.pool.len())].clone())
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_errors() {
        let provider = IdentityProvider::new(vec![], Arc::new(SharedRng::seeded(1)));
        assert!(matches!(provider.random(), Err(IdentityError::EmptyPool)));
    }

    #[test]
    fn draws_only_from_pool() {
        let pool = vec!["ua-a".to_string(), "ua-b".to_string(), "ua-c".to_string()];
        let provider = IdentityProvider::new(pool.clone(), Arc::new(SharedRng::seeded(3)));
        for _ in 0..100 {
            assert!(pool.contains(&provider.random().unwrap()));
        }
    }

    #[tokio::test]
    async fn load_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!("ua-{}.txt", std::process::id()));
        tokio::fs::write(&path, "Mozilla/5.0 A\n\n  \nMozilla/5.0 B\n").await.unwrap();

        let provider = IdentityProvider::load(&path, Arc::new(SharedRng::seeded(1)))
            .await
            .unwrap();
        assert_eq!(provider.len(), 2);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn load_rejects_empty_file() {
        let path = std::env::temp_dir().join(format!("ua-empty-{}.txt", std::process::id()));
        tokio::fs::write(&path, "\n\n").await.unwrap();

        let err = IdentityProvider::load(&path, Arc::new(SharedRng::seeded(1)))
            .await
            .err()
            .unwrap();
        assert!(err.downcast_ref::<IdentityError>().is_some());

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
