use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Rewrite the WAL once `threshold` appends have piled up since the last
/// compaction. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.wal_appends_since_compact().await;
    if threshold == 0 || appends < threshold {
        return Ok(false);
    }
    debug!(appends, threshold, "WAL compaction due");
    engine.compact_wal().await?;
    Ok(true)
}

/// Background task that periodically compacts the WAL.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            warn!("WAL compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city::CityNormalizer;
    use crate::model::UserRole;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lodgr_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path.clone(), CityNormalizer::default()).unwrap();
        for id in 1..=3 {
            engine
                .register_user(id, &format!("u{id}@example.com"), UserRole::Customer)
                .await
                .unwrap();
        }

        assert!(!compact_if_due(&engine, 10).await.unwrap());
        assert!(!compact_if_due(&engine, 0).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 3);

        assert!(compact_if_due(&engine, 3).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        drop(engine);
        let reopened = Engine::new(path, CityNormalizer::default()).unwrap();
        assert_eq!(reopened.bookings_for_user(2).await.unwrap().len(), 0);
    }
}
