//! pt-kube: Kubernetes collaborators for podtunnel
//!
//! - [`KubeconfigLoader`] reads cluster credentials from a kubeconfig file
//! - [`ApiLookup`] checks whether a service or pod exists
//! - [`WsDialerFactory`] opens port-forward tunnels over WebSocket

pub mod kubeconfig;
pub mod lookup;
pub mod tls;
pub mod transport;

pub use kubeconfig::KubeconfigLoader;
pub use lookup::ApiLookup;
pub use transport::WsDialerFactory;
