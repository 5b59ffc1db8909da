pub mod gemini;
pub mod types;

use crate::errors::Nl2SqlError;
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;
pub use types::{Content, FunctionCall, FunctionDeclaration, GenerateRequest, Part, Role};

/// A trait for interacting with an AI provider.
///
/// The provider receives the system instruction, the conversation so far and
/// the tool declarations, and returns the model's next turn. That turn holds
/// either text or one or more function calls.
#[async_trait]
pub trait AiProvider: Send + Sync + Debug + DynClone {
    async fn generate(&self, request: &GenerateRequest) -> Result<Content, Nl2SqlError>;
}

dyn_clone::clone_trait_object!(AiProvider);
