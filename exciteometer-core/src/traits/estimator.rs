/// Per-frame decibel estimation.
///
/// Implementations must be pure: the same frame always yields the same
/// result, and a returned value is never NaN.
pub trait LoudnessEstimator: Send + Sync {
    /// Decibel estimate for one raw frame, or `None` when the frame carries
    /// no usable value.
    fn sample(&self, frame: &[u8]) -> Option<f64>;

    /// Short identifier used in logs and metadata.
    fn name(&self) -> &str;

    /// Clone this estimator into a new boxed trait object.
    fn clone_box(&self) -> Box<dyn LoudnessEstimator>;
}

// Allow CaptureConfiguration to clone its estimator via trait object.
impl Clone for Box<dyn LoudnessEstimator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
