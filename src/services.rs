pub mod archive;
pub mod inspector;
pub mod locator;
pub mod prj;
pub mod report;
pub mod rules;
pub mod validator;
pub mod workspace;

pub use archive::{ArchiveInput, ArchiveInspector};
pub use inspector::InspectError;
pub use validator::ValidationService;
pub use workspace::Workspace;
