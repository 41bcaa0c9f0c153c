//! User, role and audit models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Fixed set of roles known to the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    Admin,
    ProductionManager,
    MaintenanceEngineer,
    InventoryClerk,
    Procurement,
    Finance,
    Viewer,
}

string_enum!(RoleName, "role", {
    Admin => "admin",
    ProductionManager => "production_manager",
    MaintenanceEngineer => "maintenance_engineer",
    InventoryClerk => "inventory_clerk",
    Procurement => "procurement",
    Finance => "finance",
    Viewer => "viewer",
});

impl RoleName {
    pub fn display_name(&self) -> &'static str {
        match self {
            RoleName::Admin => "Administrator",
            RoleName::ProductionManager => "Production Manager",
            RoleName::MaintenanceEngineer => "Maintenance Engineer",
            RoleName::InventoryClerk => "Inventory Clerk",
            RoleName::Procurement => "Procurement Officer",
            RoleName::Finance => "Finance Officer",
            RoleName::Viewer => "Viewer",
        }
    }
}

/// Roles whose active members receive reorder alerts by default
pub const ALERT_RECIPIENT_ROLES: &[RoleName] = &[RoleName::InventoryClerk, RoleName::Procurement];

/// Resources that can be accessed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Product,
    Bom,
    Warehouse,
    Stock,
    Order,
    Alert,
    Report,
    User,
    AuditLog,
}

string_enum!(Resource, "resource", {
    Product => "product",
    Bom => "bom",
    Warehouse => "warehouse",
    Stock => "stock",
    Order => "order",
    Alert => "alert",
    Report => "report",
    User => "user",
    AuditLog => "audit_log",
});

/// Actions that can be performed on resources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Export,
}

string_enum!(Action, "action", {
    View => "view",
    Create => "create",
    Edit => "edit",
    Delete => "delete",
    Export => "export",
});

/// A permission granting actions on a resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub resource: Resource,
    pub actions: Vec<Action>,
}

impl Permission {
    fn new(resource: Resource, actions: &[Action]) -> Self {
        Self {
            resource,
            actions: actions.to_vec(),
        }
    }
}

/// Token form of a single grant, e.g. `stock:edit`
pub fn permission_code(resource: Resource, action: Action) -> String {
    format!("{}:{}", resource, action)
}

const ALL_ACTIONS: &[Action] = &[
    Action::View,
    Action::Create,
    Action::Edit,
    Action::Delete,
    Action::Export,
];
const MANAGE: &[Action] = &[Action::View, Action::Create, Action::Edit];
const READ: &[Action] = &[Action::View];
const REPORTING: &[Action] = &[Action::View, Action::Export];

/// Permission set granted to each role
pub fn role_permissions(role: RoleName) -> Vec<Permission> {
    match role {
        RoleName::Admin => Resource::ALL
            .iter()
            .map(|r| Permission::new(*r, ALL_ACTIONS))
            .collect(),
        RoleName::ProductionManager => vec![
            Permission::new(Resource::Product, MANAGE),
            Permission::new(Resource::Bom, &[Action::View, Action::Create, Action::Edit, Action::Delete]),
            Permission::new(Resource::Warehouse, READ),
            Permission::new(Resource::Stock, READ),
            Permission::new(Resource::Order, MANAGE),
            Permission::new(Resource::Alert, READ),
            Permission::new(Resource::Report, REPORTING),
        ],
        RoleName::MaintenanceEngineer => vec![
            Permission::new(Resource::Product, READ),
            Permission::new(Resource::Bom, READ),
            Permission::new(Resource::Warehouse, READ),
            Permission::new(Resource::Stock, READ),
        ],
        RoleName::InventoryClerk => vec![
            Permission::new(Resource::Product, READ),
            Permission::new(Resource::Bom, READ),
            Permission::new(Resource::Warehouse, READ),
            Permission::new(Resource::Stock, MANAGE),
            Permission::new(Resource::Order, &[Action::View, Action::Edit]),
            Permission::new(Resource::Alert, &[Action::View, Action::Edit]),
            Permission::new(Resource::Report, READ),
        ],
        RoleName::Procurement => vec![
            Permission::new(Resource::Product, MANAGE),
            Permission::new(Resource::Warehouse, READ),
            Permission::new(Resource::Stock, &[Action::View, Action::Edit]),
            Permission::new(Resource::Alert, &[Action::View, Action::Edit]),
            Permission::new(Resource::Report, REPORTING),
        ],
        RoleName::Finance => vec![
            Permission::new(Resource::Product, READ),
            Permission::new(Resource::Bom, READ),
            Permission::new(Resource::Stock, READ),
            Permission::new(Resource::Order, READ),
            Permission::new(Resource::Report, REPORTING),
        ],
        RoleName::Viewer => [
            Resource::Product,
            Resource::Bom,
            Resource::Warehouse,
            Resource::Stock,
            Resource::Order,
            Resource::Report,
        ]
            .iter()
            .map(|r| Permission::new(*r, READ))
            .collect(),
    }
}

/// Flattened `resource:action` codes for a role, as carried in access tokens
pub fn permission_codes(role: RoleName) -> Vec<String> {
    role_permissions(role)
        .iter()
        .flat_map(|p| p.actions.iter().map(move |a| permission_code(p.resource, *a)))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: RoleName,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn permissions(&self) -> Vec<Permission> {
        role_permissions(self.name)
    }
}

/// A user account on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role_id: Option<Uuid>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub is_active: bool,
    pub last_login_ip: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// First and last name, falling back to the username when both are blank
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

string_enum!(AuditAction, "audit action", {
    Create => "create",
    Update => "update",
    Delete => "delete",
    Login => "login",
    Logout => "logout",
});

/// Append-only record of a user-visible change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: AuditAction,
    pub model_name: String,
    pub object_id: Option<String>,
    pub object_repr: Option<String>,
    pub changes: Option<Value>,
    pub ip_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Field-level diff recorded on updates, as `{"field": {"old": .., "new": ..}}`
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    fields: Map<String, Value>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `field` only if the value actually changed
    pub fn track<T>(&mut self, field: &str, old: &T, new: &T) -> &mut Self
    where
        T: Serialize + PartialEq,
    {
        if old != new {
            self.fields
                .insert(field.to_string(), json!({ "old": old, "new": new }));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_value(self) -> Option<Value> {
        if self.fields.is_empty() {
            None
        } else {
            Some(Value::Object(self.fields))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_everything() {
        let codes = permission_codes(RoleName::Admin);
        assert_eq!(codes.len(), Resource::ALL.len() * ALL_ACTIONS.len());
        assert!(codes.contains(&"audit_log:view".to_string()));
    }

    #[test]
    fn test_viewer_is_read_only() {
        let codes = permission_codes(RoleName::Viewer);
        assert!(codes.iter().all(|c| c.ends_with(":view")));
        assert!(!codes.contains(&"user:view".to_string()));
    }

    #[test]
    fn test_clerk_can_move_stock() {
        let codes = permission_codes(RoleName::InventoryClerk);
        assert!(codes.contains(&permission_code(Resource::Stock, Action::Create)));
        assert!(codes.contains(&permission_code(Resource::Alert, Action::Edit)));
        assert!(!codes.contains(&permission_code(Resource::Bom, Action::Edit)));
    }

    #[test]
    fn test_change_set_skips_unchanged_fields() {
        let mut changes = ChangeSet::new();
        changes
            .track("email", &Some("a@x.io"), &Some("b@x.io"))
            .track("department", &"ops", &"ops");
        let value = changes.into_value().unwrap();
        assert_eq!(value["email"]["old"], "a@x.io");
        assert_eq!(value["email"]["new"], "b@x.io");
        assert!(value.get("department").is_none());

        assert!(ChangeSet::new().into_value().is_none());
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            email: None,
            first_name: String::new(),
            last_name: String::new(),
            role_id: None,
            phone: None,
            department: None,
            is_active: true,
            last_login_ip: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(user.full_name(), "jdoe");
        user.first_name = "Jane".to_string();
        user.last_name = "Doe".to_string();
        assert_eq!(user.full_name(), "Jane Doe");
    }
}
