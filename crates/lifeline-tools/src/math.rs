//! # Math Provider
//!
//! Arithmetic capabilities: `add`, `subtract`, `multiply`, `divide`, `power`.
//!
//! Operands are accepted as `{"a": 5, "b": 3}` or `[5, 3]`. Integer inputs
//! produce integer results whenever the exact result is an integer.

use async_trait::async_trait;
use lifeline_core::{CapabilityProvider, ProviderDescriptor, ProviderError};
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::debug;

pub const MATH_CAPABILITIES: [&str; 5] = ["add", "subtract", "multiply", "divide", "power"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Operands {
    Named { a: Number, b: Number },
    Pair([Number; 2]),
}

impl Operands {
    fn into_pair(self) -> (Number, Number) {
        match self {
            Operands::Named { a, b } => (a, b),
            Operands::Pair([a, b]) => (a, b),
        }
    }
}

/// Arithmetic provider, id `math`.
#[derive(Debug, Clone)]
pub struct MathProvider {
    descriptor: ProviderDescriptor,
}

impl MathProvider {
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor::new("math", MATH_CAPABILITIES)
                .with_description("Integer and floating point arithmetic"),
        }
    }
}

impl Default for MathProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProvider for MathProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, capability: &str, arguments: &Value) -> Result<Value, ProviderError> {
        let (a, b) = serde_json::from_value::<Operands>(arguments.clone())?.into_pair();
        debug!(capability, %a, %b, "Evaluating arithmetic");

        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            if let Some(result) = integer_op(capability, x, y)? {
                return Ok(Value::from(result));
            }
        }

        let (x, y) = match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(ProviderError::InvalidArguments("operands must be numbers".into())),
        };
        let result = float_op(capability, x, y)?;
        Number::from_f64(result)
            .map(Value::Number)
            .ok_or_else(|| ProviderError::InvalidArguments(format!("{capability} produced a non-finite result")))
    }
}

/// Exact integer evaluation; `Ok(None)` defers to floating point.
fn integer_op(capability: &str, x: i64, y: i64) -> Result<Option<i64>, ProviderError> {
    Ok(match capability {
        "add" => x.checked_add(y),
        "subtract" => x.checked_sub(y),
        "multiply" => x.checked_mul(y),
        "divide" => {
            if y == 0 {
                return Err(ProviderError::InvalidArguments("division by zero".into()));
            }
            match x.checked_rem(y) {
                Some(0) => x.checked_div(y),
                _ => None,
            }
        }
        "power" => u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp)),
        other => return Err(ProviderError::UnsupportedCapability(other.to_string())),
    })
}

fn float_op(capability: &str, x: f64, y: f64) -> Result<f64, ProviderError> {
    match capability {
        "add" => Ok(x + y),
        "subtract" => Ok(x - y),
        "multiply" => Ok(x * y),
        "divide" if y == 0.0 => Err(ProviderError::InvalidArguments("division by zero".into())),
        "divide" => Ok(x / y),
        "power" => Ok(x.powf(y)),
        other => Err(ProviderError::UnsupportedCapability(other.to_string())),
    }
}
