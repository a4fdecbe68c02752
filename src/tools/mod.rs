pub mod booking;
pub mod executor;
pub mod extract;
pub mod handler;
pub mod registry;

pub use booking::{BookingBackend, BookingRequest};
pub use executor::{Credential, ToolExecutor, ToolOutcome, CREDENTIAL_KEY};
pub use extract::{detect, extract, parse, Extraction, ToolCall};
pub use handler::{ToolDef, ToolDescriptor, ToolHandler};
pub use registry::{ToolCatalog, ToolRegistry};
