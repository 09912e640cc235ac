pub mod api_client;
pub mod auth_client;
pub mod backend;
pub mod client_registry;
pub mod crm;
pub mod join_requests;
pub mod metrics;
pub mod organizations;
pub mod resolver;

pub use api_client::{ApiError, ApiResponse, FileUpload, OrgApiClient, RequestOptions, ORGANIZATION_HEADER};
pub use backend::{BackendError, OrganizationBackend, RestBackend};
pub use resolver::{OrganizationResolver, ResolveError};
