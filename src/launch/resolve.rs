//! Resource resolution
//!
//! All three lookups run before anything is created, so a typo in any name
//! aborts the launch with no remote side effects.

use tracing::debug;

use crate::control_plane::{ControlPlane, Flavor, Image, Network};
use crate::error::OrchestratorError;

/// Image, flavor and network resolved to live objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResources {
    pub image: Image,
    pub flavor: Flavor,
    pub network: Network,
}

/// Look up image, flavor and network by name.
///
/// Fails with `ResourceNotFound` naming the first missing object.
pub fn resolve_resources(
    control_plane: &dyn ControlPlane,
    image: &str,
    flavor: &str,
    network: &str,
) -> Result<ResolvedResources, OrchestratorError> {
    let image = control_plane.find_image(image)?;
    let flavor = control_plane.find_flavor(flavor)?;
    let network = control_plane.find_network(network)?;

    debug!(
        image = %image.id,
        flavor = %flavor.id,
        network = %network.id,
        "resolved launch resources"
    );

    Ok(ResolvedResources {
        image,
        flavor,
        network,
    })
}
