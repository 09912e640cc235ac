pub mod join_request;
pub mod organization;
pub mod user;

pub use join_request::{
    AlreadyResolved, JoinRequest, JoinRequestFilter, JoinRequestStatus, SubmitJoinRequest,
};
pub use organization::{
    MemberRole, Membership, NewOrganization, Organization, OrganizationMember, SubscriptionPlan,
};
pub use user::{session_keys, AuthState, AuthUser, Identity, UserProfile, UserRole};
