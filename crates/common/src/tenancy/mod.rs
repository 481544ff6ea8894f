//! Tenancy: resolution of tenant contexts, provisioning and tenant links

pub mod provisioning;
mod resolver;
mod session;
mod urls;

pub use provisioning::{NewTenant, ProvisioningService};
pub use resolver::{detect, Detection, RequestLocation, ResolutionFailure, TenantResolver, TenantView};
pub use session::ResolutionSession;
pub use urls::{is_loopback, is_valid_slug, slugify, tenant_url, MAX_SLUG_LEN};
