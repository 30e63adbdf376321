
pub mod error;
pub mod types;
pub mod transport;
pub mod dumper;
pub mod endpoint;
pub mod service;
pub mod ingest;
pub mod pipeline;

pub mod deps {
    pub use serde_json;
    pub use serde;
}

pub use error::{
    ErrorDescription,
    GenericError,
    ClientError,
    ClientErrorDescription,
    IngestError,
    IngestErrorDescription,
};

pub use dumper::{Dumper, DumpPolicy};
pub use endpoint::{Call, DumpConfig, Endpoint, EndpointName, EndpointRegistry, Outcome, Payload, Request};
pub use ingest::{LineSelector, LineSpec, TextSource};
pub use pipeline::{Playback, PlaybackHandle, SpeechService};
pub use service::{ClientConfig, VveService};
pub use transport::{RawResponse, TransportClient};
