//! API Module
//!
//! Message, request and result types shared by the gateway and providers.

pub mod completion;

pub use completion::{
    CallResult, Choice, CompletionParams, CompletionRequest, CompletionResponse, ContentPart,
    Message, MessageContent, Purpose, Usage,
};
