use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CkksError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Parameter mismatch: {0}")]
    ParameterMismatch(String),

    #[error("Scale mismatch: {left} vs {right}")]
    ScaleMismatch { left: f64, right: f64 },

    #[error("Level mismatch: {left} vs {right}")]
    LevelMismatch { left: usize, right: usize },

    #[error("No modulus left to rescale by")]
    LevelExhausted,

    #[error("Missing rotation key for step {0}")]
    MissingRotationKey(usize),

    #[error("Context holds no secret key")]
    MissingSecretKey,

    #[error("Vector of length {len} does not fit in {slots} slots")]
    TooManyValues { len: usize, slots: usize },

    #[error("Value {0} is not finite or exceeds the encodable range")]
    ValueOutOfRange(f64),

    #[error("Malformed key material: {0}")]
    MalformedKey(String),
}
