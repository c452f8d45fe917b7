pub mod error;
pub mod openai;
pub mod router;
pub mod sse;
pub mod transport;

pub use error::ChatError;
pub use router::{EndpointTable, ModelEndpointBinding, Provider};
pub use transport::{ByteStream, ChatRequest, ChatTransport, TransportResponse};
