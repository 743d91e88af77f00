//! One-time code generation.
//!
//! Codes carry no state between calls. Their strength comes from the
//! challenge TTL and the single comparison allowed by `validate`.

use rand::Rng;

use crate::types::VerificationCode;

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> VerificationCode;
}

/// Uniform six-digit codes drawn from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerificationCodeGenerator;

impl CodeGenerator for VerificationCodeGenerator {
    fn generate(&self) -> VerificationCode {
        let value = rand::thread_rng().gen_range(0..1_000_000u32);
        VerificationCode::from_value(value)
    }
}
