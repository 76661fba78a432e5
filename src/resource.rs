use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// =============================================================================
// Resource Kinds
// =============================================================================

/// Label under which observations for one kind of API resource are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Root,
    System,
    Route,
    Stop,
    Trip,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Root => "root",
            ResourceKind::System => "system",
            ResourceKind::Route => "route",
            ResourceKind::Stop => "stop",
            ResourceKind::Trip => "trip",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Response Shapes
// =============================================================================

// Descriptive fields are never validated: absent or `null` decodes to the
// default. Only the `href`s a walker follows are required.

/// Deserializes `null` as `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: u64,
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Root {
    pub systems: Link,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct System {
    pub routes: Link,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Route {
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_maps: Vec<ServiceMap>,
}

/// One pattern of stops served by a route.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceMap {
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stops: Vec<StopSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stop {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stop_times: Vec<StopTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopTime {
    #[serde(default, deserialize_with = "null_as_default")]
    pub trip: TripRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripRef {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub href: String,
}
