use serde::{Deserialize, Serialize};

pub type ProjectId = String;

/// A tenant scope: a directory, a quota, and a set of files (spec §3).
///
/// `used_quota` is the authoritative "stored bytes" figure, reconciled at
/// the three points named in spec §4.3; it does not include in-flight
/// reservations (`Upload::declared_size` sums), which callers must add in
/// separately when computing remaining quota.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: ProjectId,
    pub quota: i64,
    pub used_quota: i64,
}

impl Project {
    /// `quota - used_quota`, ignoring in-flight reservations. Callers
    /// computing admission must subtract `reserved_bytes` themselves (spec
    /// §4.3) since that figure is scoped to a single admission check, not
    /// to the project row.
    pub fn remaining_quota(&self) -> i64 {
        self.quota - self.used_quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_quota_subtracts_used() {
        let p = Project {
            id: "proj".into(),
            quota: 100,
            used_quota: 40,
        };
        assert_eq!(p.remaining_quota(), 60);
    }
}
