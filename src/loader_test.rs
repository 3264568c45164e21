use super::*;

#[tokio::test]
async fn test_static_loader_is_immediately_ready() {
    let loader = StaticLoader;
    assert!(loader.load().await.is_ok());
}

#[tokio::test]
async fn test_failing_loader_reports_which_surface() {
    struct FailingLoader;

    #[async_trait]
    impl SdkLoader for FailingLoader {
        async fn load(&self) -> Result<(), LoadError> {
            Err(LoadError::Identity("script blocked".to_string()))
        }
    }

    let err = FailingLoader.load().await.unwrap_err();
    assert!(err.to_string().contains("identity services"));
}
