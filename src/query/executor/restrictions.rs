use crate::types::{CourseId, CourseModuleId, DocumentKey};
use serde::{Deserialize, Serialize};

/// A course module together with the course it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModuleRef {
    pub id: CourseModuleId,
    pub course_id: CourseId,
}

impl CourseModuleRef {
    pub fn new(id: CourseModuleId, course_id: CourseId) -> Self {
        CourseModuleRef { id, course_id }
    }

    fn matches(&self, key: &DocumentKey) -> bool {
        key.course_module_id == Some(self.id) && key.course_id == Some(self.course_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleRestriction {
    #[default]
    Any,
    Single(CourseModuleId),
    /// Only these modules. An empty list matches nothing.
    Set(Vec<CourseModuleRef>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupRestriction {
    #[default]
    Any,
    /// Only documents without a group.
    NoGroup,
    Groups {
        ids: Vec<i64>,
        /// Also accept documents with no group.
        allow_no_group: bool,
        /// Modules whose documents pass regardless of group.
        exceptions: Vec<CourseModuleRef>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserRestriction {
    #[default]
    Any,
    /// Only documents without a user.
    NoUser,
    User { id: i64, allow_no_user: bool },
}

/// Conjunctive filters applied to every candidate document. The caller is
/// responsible for having authorised the values it puts here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScopeRestrictions {
    pub course_id: Option<CourseId>,
    pub plugin: Option<String>,
    pub course_module: ModuleRestriction,
    pub groups: GroupRestriction,
    pub user: UserRestriction,
}

impl ScopeRestrictions {
    pub fn for_course(course_id: CourseId) -> Self {
        ScopeRestrictions {
            course_id: Some(course_id),
            ..Default::default()
        }
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_course_module(mut self, course_module_id: CourseModuleId) -> Self {
        self.course_module = ModuleRestriction::Single(course_module_id);
        self
    }

    pub fn with_course_modules(mut self, modules: Vec<CourseModuleRef>) -> Self {
        self.course_module = ModuleRestriction::Set(modules);
        self
    }

    pub fn with_groups(mut self, groups: GroupRestriction) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_user(mut self, user: UserRestriction) -> Self {
        self.user = user;
        self
    }

    /// Courses the scope is limited to, or `None` when any course may match.
    pub fn course_ids(&self) -> Option<Vec<CourseId>> {
        let from_modules = match &self.course_module {
            ModuleRestriction::Set(modules) => {
                let mut ids: Vec<CourseId> = modules.iter().map(|m| m.course_id).collect();
                ids.sort_unstable();
                ids.dedup();
                Some(ids)
            }
            _ => None,
        };
        match (self.course_id, from_modules) {
            (Some(id), Some(ids)) => Some(ids.into_iter().filter(|&c| c == id).collect()),
            (Some(id), None) => Some(vec![id]),
            (None, ids) => ids,
        }
    }

    pub fn matches(&self, key: &DocumentKey) -> bool {
        if let Some(course_id) = self.course_id {
            if key.course_id != Some(course_id) {
                return false;
            }
        }
        if let Some(plugin) = &self.plugin {
            if &key.plugin != plugin {
                return false;
            }
        }
        let module_ok = match &self.course_module {
            ModuleRestriction::Any => true,
            ModuleRestriction::Single(id) => key.course_module_id == Some(*id),
            ModuleRestriction::Set(modules) => modules.iter().any(|m| m.matches(key)),
        };
        if !module_ok {
            return false;
        }
        let group_ok = match &self.groups {
            GroupRestriction::Any => true,
            GroupRestriction::NoGroup => key.group_id.is_none(),
            GroupRestriction::Groups {
                ids,
                allow_no_group,
                exceptions,
            } => {
                let in_group = match key.group_id {
                    Some(group) => ids.contains(&group),
                    None => *allow_no_group,
                };
                in_group || exceptions.iter().any(|m| m.matches(key))
            }
        };
        if !group_ok {
            return false;
        }
        match self.user {
            UserRestriction::Any => true,
            UserRestriction::NoUser => key.user_id.is_none(),
            UserRestriction::User { id, allow_no_user } => match key.user_id {
                Some(user) => user == id,
                None => allow_no_user,
            },
        }
    }
}
