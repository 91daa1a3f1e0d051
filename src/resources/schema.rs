//! Static schema describing each resource kind.
//!
//! A [`KindSchema`] tells the shared resolver, diff engine and reconciler
//! where a kind lives in the API, how it is addressed and how each of its
//! fields is compared and updated.

use serde::Serialize;

/// Resource kinds known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Virtual server.
    Server,
    /// Anti-affinity server group.
    ServerGroup,
    /// Block storage volume.
    Volume,
    /// Private network.
    Network,
    /// Subnet of a private network.
    Subnet,
    /// Floating IP address or network.
    FloatingIp,
    /// Object storage user.
    ObjectsUser,
    /// Load balancer.
    LoadBalancer,
    /// Load balancer pool.
    LoadBalancerPool,
    /// Load balancer listener.
    LoadBalancerListener,
}

impl Kind {
    /// All kinds, in registration order.
    pub const ALL: [Self; 10] = [
        Self::Server,
        Self::ServerGroup,
        Self::Volume,
        Self::Network,
        Self::Subnet,
        Self::FloatingIp,
        Self::ObjectsUser,
        Self::LoadBalancer,
        Self::LoadBalancerPool,
        Self::LoadBalancerListener,
    ];

    /// Returns the kind tag used in manifests and result envelopes.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::ServerGroup => "server_group",
            Self::Volume => "volume",
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::FloatingIp => "floating_ip",
            Self::ObjectsUser => "objects_user",
            Self::LoadBalancer => "load_balancer",
            Self::LoadBalancerPool => "load_balancer_pool",
            Self::LoadBalancerListener => "load_balancer_listener",
        }
    }

    /// Parses a kind tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a desired value is compared with the remote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Case-sensitive equality of scalars.
    Exact,
    /// Numeric equality, independent of integer/float representation.
    Numeric,
    /// Order-independent equality of lists.
    Set,
    /// Key/value equality of maps.
    Map,
    /// Element-wise equality of lists where order matters.
    Ordered,
}

/// How a field takes part in reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    /// Sent on create, changed later with a partial update.
    Updatable,
    /// Sent on create only; never diffed afterwards.
    CreateOnly,
    /// Narrows name lookups (zone, parent) and is sent on create.
    Scope,
    /// Sent on create, changed later through an action endpoint.
    Action,
}

/// Schema of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as written in manifests and normalized remote state.
    pub name: &'static str,
    /// Key used in API request bodies.
    pub api_key: &'static str,
    /// Comparison used by the diff engine.
    pub comparison: Comparison,
    /// Participation mode.
    pub mode: FieldMode,
    /// Kind this field references by UUID or name, if any.
    pub references: Option<Kind>,
}

impl FieldSpec {
    /// A field updated in place.
    #[must_use]
    pub const fn updatable(name: &'static str, comparison: Comparison) -> Self {
        Self {
            name,
            api_key: name,
            comparison,
            mode: FieldMode::Updatable,
            references: None,
        }
    }

    /// A field only sent on creation.
    #[must_use]
    pub const fn create_only(name: &'static str, comparison: Comparison) -> Self {
        Self {
            name,
            api_key: name,
            comparison,
            mode: FieldMode::CreateOnly,
            references: None,
        }
    }

    /// A lookup scope field.
    #[must_use]
    pub const fn scope(name: &'static str) -> Self {
        Self {
            name,
            api_key: name,
            comparison: Comparison::Exact,
            mode: FieldMode::Scope,
            references: None,
        }
    }

    /// A field changed through an action endpoint.
    #[must_use]
    pub const fn action(name: &'static str) -> Self {
        Self {
            name,
            api_key: name,
            comparison: Comparison::Exact,
            mode: FieldMode::Action,
            references: None,
        }
    }

    /// Uses a different key in request bodies.
    #[must_use]
    pub const fn sent_as(mut self, api_key: &'static str) -> Self {
        self.api_key = api_key;
        self
    }

    /// Marks the field as a reference to another kind.
    #[must_use]
    pub const fn referencing(mut self, kind: Kind) -> Self {
        self.references = Some(kind);
        self
    }

    /// Returns true if the diff engine compares this field.
    #[must_use]
    pub const fn is_compared(&self) -> bool {
        matches!(self.mode, FieldMode::Updatable | FieldMode::Action)
    }
}

/// Schema of a resource kind.
#[derive(Debug)]
pub struct KindSchema {
    /// The kind.
    pub kind: Kind,
    /// Collection path relative to the API base.
    pub path: &'static str,
    /// Key of the immutable identifier in remote state.
    pub id_key: &'static str,
    /// Key of the human-readable lookup attribute, if the kind has one.
    pub name_key: Option<&'static str>,
    /// Whether the identifier is a UUID.
    pub uuid_ids: bool,
    /// Fields in the order changes are reported.
    pub fields: &'static [FieldSpec],
    /// Fields required to create the resource.
    pub required_for_create: &'static [&'static str],
    /// Fields that carry secrets.
    pub secret_fields: &'static [&'static str],
}

/// Remote keys never compared, whatever the kind.
pub const READ_ONLY_FIELDS: &[&str] = &["href", "uuid", "id", "created_at", "updated_at"];

impl KindSchema {
    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the path of a single resource.
    #[must_use]
    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{id}", self.path)
    }

    /// Returns true if the field holds a secret.
    #[must_use]
    pub fn is_secret(&self, name: &str) -> bool {
        self.secret_fields.contains(&name)
    }

    /// Returns true if the key is read-only for this kind.
    #[must_use]
    pub fn is_read_only(&self, name: &str) -> bool {
        name == self.id_key || READ_ONLY_FIELDS.contains(&name)
    }
}
