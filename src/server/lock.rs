//! Hierarchical path-prefix lock manager (C5, spec §4.4).
//!
//! Mutual exclusion is enforced across any two paths where one is a
//! prefix of the other, scoped to a single project. The acquire algorithm
//! runs as a single Lua script inside Redis so the scan-then-insert
//! sequence is atomic with respect to other acquirers; `release` is a
//! plain `HDEL` and is intentionally silent about "nothing to release".

use std::time::Duration;

use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("locked by another task")]
    Taken,
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// `KEYS[1]` is the project's lock hash; `ARGV[1]` is the path being
/// acquired, `ARGV[2]` the new deadline, `ARGV[3]` the current time.
/// Lazily garbage-collects any entry whose deadline has passed before
/// checking for a prefix conflict, per spec §4.4 step 2.
const ACQUIRE_SCRIPT: &str = r#"
local hash = KEYS[1]
local path = ARGV[1]
local deadline = ARGV[2]
local now = tonumber(ARGV[3])

local entries = redis.call('HGETALL', hash)
for i = 1, #entries, 2 do
    local locked_path = entries[i]
    local locked_deadline = tonumber(entries[i + 1])
    if now > locked_deadline then
        redis.call('HDEL', hash, locked_path)
    elseif locked_path == path
        or string.sub(path, 1, string.len(locked_path)) == locked_path
        or string.sub(locked_path, 1, string.len(path)) == path then
        return 0
    end
end

redis.call('HSET', hash, path, deadline)
return 1
"#;

pub struct LockManager {
    client: redis::Client,
}

impl LockManager {
    pub fn new(redis_url: &str) -> Result<Self, LockError> {
        Ok(LockManager {
            client: redis::Client::open(redis_url)?,
        })
    }

    fn hash_key(project_id: &str) -> String {
        format!("pifs:locks:{project_id}")
    }

    /// Attempts to acquire a lock once, without retrying.
    async fn try_acquire(
        &self,
        project_id: &str,
        path: &str,
        ttl: Duration,
        now: i64,
    ) -> Result<bool, LockError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let deadline = now + ttl.as_secs() as i64;
        let acquired: i64 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(Self::hash_key(project_id))
            .arg(path)
            .arg(deadline)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;
        Ok(acquired == 1)
    }

    /// Retries with ~200ms bounded backoff until `timeout` elapses (spec
    /// §4.4). `now` is supplied by the caller so tests can drive the
    /// clock explicitly instead of depending on wall time.
    pub async fn acquire(
        &self,
        project_id: &str,
        path: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<(), LockError> {
        let start = tokio::time::Instant::now();
        loop {
            let now = proxmox_time::epoch_i64();
            if self.try_acquire(project_id, path, ttl, now).await? {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(LockError::Taken);
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Idempotent: releasing an already-expired or already-released lock
    /// is not reported as an error (spec §4.4).
    pub async fn release(&self, project_id: &str, path: &str) -> Result<(), LockError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.hdel(Self::hash_key(project_id), path).await?;
        Ok(())
    }
}

/// Scoped guard returned by [`with_lock`]; releases on drop via a spawned
/// task since `Drop` cannot be async.
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    project_id: String,
    path: String,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let manager_client = self.manager.client.clone();
        let project_id = self.project_id.clone();
        let path = self.path.clone();
        tokio::spawn(async move {
            let guard = LockManager { client: manager_client };
            if let Err(e) = guard.release(&project_id, &path).await {
                log::warn!("failed to release lock {project_id}:{path}: {e}");
            }
        });
    }
}

/// Acquires a lock and returns a guard that releases it on drop,
/// mirroring the `with_lock(project, path, ttl) { ... }` form from spec
/// §4.4.
pub async fn with_lock<'a>(
    manager: &'a LockManager,
    project_id: &str,
    path: &str,
    ttl: Duration,
    timeout: Duration,
) -> Result<LockGuard<'a>, LockError> {
    manager.acquire(project_id, path, ttl, timeout).await?;
    Ok(LockGuard {
        manager,
        project_id: project_id.to_string(),
        path: path.to_string(),
    })
}
