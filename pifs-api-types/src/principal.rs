use serde::{Deserialize, Serialize};

/// The authenticated identity for a request, projected from whichever
/// credential resolved (bearer token or HTTP Basic). See spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    /// `None` means "all of the user's projects" (HTTP Basic auth, or the
    /// admin token, grants this).
    pub allowed_projects: Option<Vec<String>>,
    pub admin: bool,
}

impl Principal {
    pub fn admin(username: impl Into<String>) -> Self {
        Principal {
            username: username.into(),
            allowed_projects: None,
            admin: true,
        }
    }

    /// Whether this principal may operate on `project_id`.
    pub fn can_access(&self, project_id: &str) -> bool {
        if self.admin {
            return true;
        }
        match &self.allowed_projects {
            None => true,
            Some(projects) => projects.iter().any(|p| p == project_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_access_anything() {
        let p = Principal::admin("root");
        assert!(p.can_access("whatever"));
    }

    #[test]
    fn scoped_principal_respects_project_list() {
        let p = Principal {
            username: "alice".into(),
            allowed_projects: Some(vec!["proj_a".into()]),
            admin: false,
        };
        assert!(p.can_access("proj_a"));
        assert!(!p.can_access("proj_b"));
    }

    #[test]
    fn none_projects_means_all_projects() {
        let p = Principal {
            username: "alice".into(),
            allowed_projects: None,
            admin: false,
        };
        assert!(p.can_access("anything"));
    }
}
