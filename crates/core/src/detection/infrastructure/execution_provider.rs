/// ONNX execution providers to register for the neural backend.
///
/// ONNX Runtime silently uses the CPU provider when none of these can be
/// initialized, so an empty list means "CPU only".
pub fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_most_one_accelerator_is_requested() {
        assert!(preferred_execution_providers().len() <= 1);
    }
}
