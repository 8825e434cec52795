//! Target resolution
//!
//! A bare name may refer to a service or a pod. Services win; a pod is only
//! looked up when no service of that name exists.

use pt_core::traits::{Lookup, TargetLookup};
use pt_core::{ClusterCredentials, ResolveError, TargetIdentity, TargetKind};

/// Resolve `name` in `namespace` to a service or pod.
///
/// Lookup failures other than "missing" are returned unchanged.
pub async fn resolve_target(
    lookup: &dyn TargetLookup,
    credentials: &ClusterCredentials,
    namespace: &str,
    name: &str,
) -> Result<TargetIdentity, ResolveError> {
    for kind in TargetKind::PRECEDENCE {
        match lookup.lookup(credentials, kind, namespace, name).await? {
            Lookup::Found => {
                tracing::debug!("Resolved {}/{} as {}", namespace, name, kind);
                return Ok(TargetIdentity::new(namespace, kind, name));
            }
            Lookup::Missing => {
                tracing::debug!("No {} named {} in {}", kind, name, namespace);
            }
        }
    }

    Err(ResolveError::NotFound {
        namespace: namespace.to_string(),
        name: name.to_string(),
    })
}
