//! Identity resolution
//!
//! Builds the user and flavor lookups while the collector is already
//! running. The preparer awaits the handle before its first item.

use crate::resource::{Flavor, RunReader};
use std::collections::HashMap;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct IdentityMaps {
    /// user id -> user name
    pub users: HashMap<String, String>,
    /// flavor id -> flavor
    pub flavors: HashMap<String, Flavor>,
}

/// Both listings degrade to an empty map on failure
pub async fn resolve(reader: &RunReader) -> IdentityMaps {
    let (users, flavors) = tokio::join!(reader.list_all_users(), reader.list_all_flavors());

    let users = match users {
        Ok(users) => users.into_iter().map(|u| (u.id, u.name)).collect(),
        Err(e) => {
            tracing::error!(error = %e, "error creating user identity map");
            HashMap::new()
        }
    };
    let flavors = match flavors {
        Ok(flavors) => flavors.into_iter().map(|f| (f.id.clone(), f)).collect(),
        Err(e) => {
            tracing::error!(error = %e, "error creating flavor map");
            HashMap::new()
        }
    };

    let maps = IdentityMaps { users, flavors };
    tracing::debug!(users = maps.users.len(), flavors = maps.flavors.len(), "identity maps resolved");
    maps
}

pub fn spawn(reader: RunReader) -> JoinHandle<IdentityMaps> {
    tokio::spawn(async move { resolve(&reader).await })
}

/// Wait for the resolver; a failed task yields empty maps
pub async fn wait(handle: Option<JoinHandle<IdentityMaps>>) -> IdentityMaps {
    let Some(handle) = handle else {
        return IdentityMaps::default();
    };
    match handle.await {
        Ok(maps) => maps,
        Err(e) => {
            tracing::error!(error = %e, "identity resolver failed");
            IdentityMaps::default()
        }
    }
}
