//! Data access layer (Repository pattern)

pub mod audit;
pub mod membership;
pub mod module;
pub mod resource;

pub use audit::AuditRepository;
pub use membership::MembershipRepository;
pub use module::ModuleRepository;
pub use resource::ResourceRepository;
