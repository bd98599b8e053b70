use uuid::Uuid;

use crate::error::SessionError;
use crate::models::{Role, UserProfile};
use crate::store::RecordStore;

/// The acting user, resolved once from their profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Student {
        id: Uuid,
        name: String,
        organize_id: Option<Uuid>,
    },
    Parent {
        id: Uuid,
        name: String,
        organize_id: Option<Uuid>,
    },
    Teacher {
        id: Uuid,
        name: String,
        organize_id: Option<Uuid>,
    },
    Admin {
        id: Uuid,
        name: String,
    },
}

impl Session {
    pub fn from_profile(profile: &UserProfile) -> Result<Self, SessionError> {
        let id = profile.id;
        let name = profile.name.clone();
        let organize_id = profile.organize_id;

        Ok(match profile.role.parse::<Role>()? {
            Role::Siswa => Session::Student { id, name, organize_id },
            Role::Ortu => Session::Parent { id, name, organize_id },
            Role::Guru => Session::Teacher { id, name, organize_id },
            Role::Admin => Session::Admin { id, name },
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Session::Student { .. } => Role::Siswa,
            Session::Parent { .. } => Role::Ortu,
            Session::Teacher { .. } => Role::Guru,
            Session::Admin { .. } => Role::Admin,
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            Session::Student { id, .. }
            | Session::Parent { id, .. }
            | Session::Teacher { id, .. }
            | Session::Admin { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Session::Student { name, .. }
            | Session::Parent { name, .. }
            | Session::Teacher { name, .. }
            | Session::Admin { name, .. } => name,
        }
    }

    pub fn organize_id(&self) -> Option<Uuid> {
        match self {
            Session::Student { organize_id, .. }
            | Session::Parent { organize_id, .. }
            | Session::Teacher { organize_id, .. } => *organize_id,
            Session::Admin { .. } => None,
        }
    }

    pub fn require(&self, role: Role, action: &'static str) -> Result<(), SessionError> {
        if self.role() == role {
            Ok(())
        } else {
            Err(SessionError::Forbidden {
                action,
                role: self.role(),
            })
        }
    }
}

/// Whose records a view reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Student(Uuid),
    Organization(Uuid),
    SystemWide,
    /// Nothing to show yet: no class joined, or no student linked.
    Pending,
}

impl Scope {
    /// Narrows a system-wide scope to one organization. Other scopes are
    /// already narrower and stay as they are.
    pub fn within(self, organize_id: Option<Uuid>) -> Scope {
        match (self, organize_id) {
            (Scope::SystemWide, Some(id)) => Scope::Organization(id),
            (scope, _) => scope,
        }
    }
}

pub async fn load_session<S: RecordStore>(
    store: &S,
    user_id: Option<Uuid>,
) -> anyhow::Result<Session> {
    let user_id = user_id.ok_or(SessionError::MissingUser)?;
    let profile = store
        .profile(user_id)
        .await?
        .ok_or(SessionError::UnknownUser(user_id))?;
    let session = Session::from_profile(&profile)?;
    tracing::debug!(user_id = %user_id, role = %session.role(), "session loaded");
    Ok(session)
}

/// Resolves the records a session may view. Backend failures and missing
/// links resolve to `Scope::Pending` rather than an error.
pub async fn resolve_scope<S: RecordStore>(store: &S, session: &Session) -> Scope {
    match session {
        Session::Student { id, .. } => Scope::Student(*id),
        Session::Teacher { organize_id, .. } => {
            organize_id.map_or(Scope::Pending, Scope::Organization)
        }
        Session::Admin { .. } => Scope::SystemWide,
        Session::Parent {
            id, organize_id, ..
        } => {
            let Some(organize_id) = organize_id else {
                return Scope::Pending;
            };
            // Parents are not linked to a specific child; the first student
            // of the parent's class stands in for it.
            match store.students_in_organize(*organize_id, Some(1)).await {
                Ok(students) => match students.first() {
                    Some(child) => {
                        tracing::debug!(
                            parent_id = %id,
                            child_id = %child.id,
                            "parent scope resolved to first student of class"
                        );
                        Scope::Student(child.id)
                    }
                    None => Scope::Pending,
                },
                Err(error) => {
                    tracing::error!(error = %error, parent_id = %id, "failed to resolve child");
                    Scope::Pending
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn session_for(store: &MemoryStore, id: Uuid) -> Session {
        let profile = store.users.iter().find(|user| user.id == id).unwrap();
        Session::from_profile(profile).unwrap()
    }

    #[test]
    fn unknown_role_is_rejected() {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            name: "Tamu".to_string(),
            email: "tamu@example.org".to_string(),
            role: "tamu".to_string(),
            organize_id: None,
        };
        assert_eq!(
            Session::from_profile(&profile),
            Err(SessionError::UnknownRole("tamu".to_string()))
        );
    }

    #[tokio::test]
    async fn student_scope_is_self() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let siswa = store.add_user("Ali", "siswa", Some(org));
        let session = session_for(&store, siswa);
        assert_eq!(resolve_scope(&store, &session).await, Scope::Student(siswa));
    }

    #[tokio::test]
    async fn parent_scope_is_first_student_of_class() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let first = store.add_user("Ali", "siswa", Some(org));
        store.add_user("Zaid", "siswa", Some(org));
        let ortu = store.add_user("Umar", "ortu", Some(org));
        let session = session_for(&store, ortu);
        assert_eq!(resolve_scope(&store, &session).await, Scope::Student(first));
    }

    #[tokio::test]
    async fn parent_without_child_is_pending() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let ortu = store.add_user("Umar", "ortu", Some(org));
        store.add_user("Ustadz Hamid", "guru", Some(org));
        let session = session_for(&store, ortu);
        assert_eq!(resolve_scope(&store, &session).await, Scope::Pending);
    }

    #[tokio::test]
    async fn backend_failure_resolves_to_pending() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        store.add_user("Ali", "siswa", Some(org));
        let ortu = store.add_user("Umar", "ortu", Some(org));
        let session = session_for(&store, ortu);
        store.failing = true;
        assert_eq!(resolve_scope(&store, &session).await, Scope::Pending);
    }

    #[tokio::test]
    async fn teacher_and_admin_scopes() {
        let mut store = MemoryStore::default();
        let org = store.add_organize("Halaqah Al-Falah");
        let guru = store.add_user("Hamid", "guru", Some(org));
        let lone_guru = store.add_user("Yusuf", "guru", None);
        let admin = store.add_user("Admin", "admin", None);

        let teacher = session_for(&store, guru);
        assert_eq!(resolve_scope(&store, &teacher).await, Scope::Organization(org));
        let lone = session_for(&store, lone_guru);
        assert_eq!(resolve_scope(&store, &lone).await, Scope::Pending);
        let admin = session_for(&store, admin);
        assert_eq!(resolve_scope(&store, &admin).await, Scope::SystemWide);
        assert_eq!(Scope::SystemWide.within(Some(org)), Scope::Organization(org));
    }

    #[tokio::test]
    async fn missing_user_is_a_session_error() {
        let store = MemoryStore::default();
        let id = Uuid::new_v4();
        let error = load_session(&store, Some(id)).await.unwrap_err();
        assert_eq!(
            error.downcast_ref::<SessionError>(),
            Some(&SessionError::UnknownUser(id))
        );
    }

    #[test]
    fn require_checks_role() {
        let session = Session::Parent {
            id: Uuid::new_v4(),
            name: "Umar".to_string(),
            organize_id: None,
        };
        assert_eq!(
            session.require(Role::Guru, "review"),
            Err(SessionError::Forbidden {
                action: "review",
                role: Role::Ortu
            })
        );
    }
}
