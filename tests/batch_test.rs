use std::sync::Arc;
use stockmeta::{
    AnalysisMethod, BatchAsset, BatchRunner, BatchSubmission, Category, MediaType, PipelineConfig,
    PromptContext, ProviderKind, StaticCredentialStore, PLACEHOLDER_NOTE,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OPENAI_KEY: &str = "sk-test-0123456789abcdef";

fn config(server: &MockServer, kind: ProviderKind) -> PipelineConfig {
    let mut config = PipelineConfig::default().with_endpoint(kind, server.uri());
    config.retry.delay_ms = 0;
    config.batch.pacing_pause_ms = 0;
    config
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{"message": {"content": content}}]
    }))
}

fn image_asset(filename: &str) -> BatchAsset {
    BatchAsset {
        filename: filename.into(),
        content: "data:image/jpeg;base64,/9j/4AAQSkZJRgABAQ==".into(),
        media_type: None,
    }
}

#[tokio::test]
async fn test_batch_groups_results_and_reports_unconfigured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(
            r#"{"title":"Sunlit meadow","keywords":"meadow, flowers, spring","category":14,"releases":"None"}"#,
        ))
        .expect(2)
        .mount(&server)
        .await;

    let credentials = StaticCredentialStore::new().with_key(ProviderKind::OpenAi, OPENAI_KEY);
    let runner = BatchRunner::new(Arc::new(credentials), config(&server, ProviderKind::OpenAi));

    let submission = BatchSubmission {
        assets: vec![image_asset("a.jpg"), image_asset("b.jpg")],
        services: vec![ProviderKind::OpenAi, ProviderKind::Cohere],
        custom_prompt: String::new(),
    };
    let outcome = runner.run(submission).await.unwrap();

    assert_eq!(outcome.total_assets, 2);
    assert_eq!(outcome.total_analyses, 4);
    assert_eq!(outcome.submitted, outcome.completed);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.succeeded(), 2);

    let mut not_configured = 0;
    for (filename, results) in &outcome.results {
        assert_eq!(results.len(), 2, "bucket {filename}");
        for task in results {
            assert_eq!(&task.filename, filename);
            match task.service {
                ProviderKind::OpenAi => {
                    assert!(task.result.success);
                    assert_eq!(task.result.title, "Sunlit meadow");
                    assert_eq!(task.result.keywords, vec!["meadow", "flowers", "spring"]);
                    assert_eq!(task.result.category, Category::PlantsAndFlowers);
                }
                ProviderKind::Cohere => {
                    assert!(!task.result.success);
                    assert!(task.result.error.contains("Cohere API key not configured"));
                    not_configured += 1;
                }
                other => panic!("unexpected service {other}"),
            }
        }
    }
    assert_eq!(not_configured, 2);

    let json = serde_json::to_value(&outcome).unwrap();
    let first = &json["results"]["a.jpg"][0];
    assert!(first.get("service").is_some());
    assert!(first.get("raw_response").is_some());
}

#[tokio::test]
async fn test_batch_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion(r#"{"title":"Harbor","keywords":["boat"]}"#))
        .mount(&server)
        .await;

    let credentials = StaticCredentialStore::new().with_key(ProviderKind::OpenAi, OPENAI_KEY);
    let runner = BatchRunner::new(Arc::new(credentials), config(&server, ProviderKind::OpenAi));

    let outcome = runner
        .run(BatchSubmission {
            assets: vec![image_asset("harbor.jpg")],
            services: vec![ProviderKind::OpenAi],
            custom_prompt: String::new(),
        })
        .await
        .unwrap();

    let task = &outcome.results["harbor.jpg"][0];
    assert!(task.result.success);
    assert_eq!(task.result.title, "Harbor");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_batch_text_asset_carries_custom_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Additional context: autumn palette"))
        .respond_with(completion(
            "```json\n{\"title\":\"Cozy reading nook\",\"keywords\":[\"book\",\"blanket\"],\"category\":\"Lifestyle\"}\n```",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let credentials =
        StaticCredentialStore::new().with_key(ProviderKind::DeepSeek, "ds-0123456789abcdef");
    let runner = BatchRunner::new(Arc::new(credentials), config(&server, ProviderKind::DeepSeek));

    let outcome = runner
        .run(BatchSubmission {
            assets: vec![BatchAsset {
                filename: "concept".into(),
                content: "a reading corner with a warm blanket".into(),
                media_type: Some(MediaType::Text),
            }],
            services: vec![ProviderKind::DeepSeek],
            custom_prompt: "\"autumn palette\"\n".into(),
        })
        .await
        .unwrap();

    let result = &outcome.results["concept"][0].result;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.title, "Cozy reading nook");
    assert_eq!(result.category, Category::Lifestyle);
}

#[tokio::test]
async fn test_batch_uses_runner_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("You tag editorial photos for a travel agency"))
        .and(body_string_contains("Additional context: coastal towns"))
        .respond_with(completion(r#"{"title":"Harbor at dusk","keywords":["harbor"]}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Additional context: fishing boats"))
        .respond_with(completion(r#"{"title":"Boats","keywords":["boat"]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = StaticCredentialStore::new().with_key(ProviderKind::OpenAi, OPENAI_KEY);
    let runner = BatchRunner::new(Arc::new(credentials), config(&server, ProviderKind::OpenAi))
        .with_prompt(
            PromptContext::new()
                .with_system_prompt("You tag editorial photos for a travel agency.")
                .with_context("coastal towns"),
        );

    // A blank custom prompt keeps the runner's context.
    let outcome = runner
        .run(BatchSubmission {
            assets: vec![image_asset("harbor.jpg")],
            services: vec![ProviderKind::OpenAi],
            custom_prompt: "  ".into(),
        })
        .await
        .unwrap();
    let result = &outcome.results["harbor.jpg"][0].result;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.title, "Harbor at dusk");

    // A non-blank one replaces it, still under the runner's system prompt.
    let outcome = runner
        .run(BatchSubmission {
            assets: vec![image_asset("boats.jpg")],
            services: vec![ProviderKind::OpenAi],
            custom_prompt: "fishing boats".into(),
        })
        .await
        .unwrap();
    let result = &outcome.results["boats.jpg"][0].result;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.title, "Boats");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains("You tag editorial photos for a travel agency."));
        assert!(!body.contains("You generate Adobe Stock metadata."));
    }
}

#[tokio::test]
async fn test_batch_video_without_ffmpeg_uses_placeholder_frames() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("key frames extracted from a video"))
        .and(body_string_contains("Additional context: studio b-roll"))
        .respond_with(completion(r#"{"title":"Gray frame","keywords":["gray","minimal"]}"#))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = config(&server, ProviderKind::Groq);
    config.video.ffmpeg_path = "/nonexistent/ffmpeg".into();
    config.video.ffprobe_path = "/nonexistent/ffprobe".into();

    let credentials =
        StaticCredentialStore::new().with_key(ProviderKind::Groq, "gsk_0123456789abcdefghij");
    let runner = BatchRunner::new(Arc::new(credentials), config);

    let outcome = runner
        .run(BatchSubmission {
            assets: vec![BatchAsset {
                filename: "clip.mp4".into(),
                content: "data:video/mp4;base64,AAAAIGZ0eXBpc29t".into(),
                media_type: None,
            }],
            services: vec![ProviderKind::Groq],
            custom_prompt: "studio b-roll".into(),
        })
        .await
        .unwrap();

    let result = &outcome.results["clip.mp4"][0].result;
    assert!(result.success, "{}", result.error);
    assert_eq!(result.title, "Gray frame");

    let video = result.video.as_ref().unwrap();
    assert_eq!(video.method, AnalysisMethod::FrameSampling);
    assert_eq!(video.frames_total, 3);
    assert_eq!(video.frames_analyzed, 3);
    assert_eq!(video.note.as_deref(), Some(PLACEHOLDER_NOTE));
}
