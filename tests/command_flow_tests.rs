/// End-to-end command flow tests
///
/// Runs the chat command router and the dashboard API against one shared
/// application context, with a recording transport standing in for the
/// chat platform. Stock moves in through one surface and out through the
/// other, and both see the same inventory and activity trail.
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use quartermaster::{
    allocation::Requester,
    bot::{ChatMessage, ChatTransport, CommandRouter},
    config::{
        AuthConfig, BootstrapAdmin, BotConfig, LoggingConfig, RateLimitConfig, ServerConfig,
        ServiceConfig, StorageConfig,
    },
    context::AppContext,
    error::QmResult,
    server,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingTransport {
    replies: Mutex<Vec<String>>,
    privates: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn replies(&self) -> Vec<String> {
        self.replies.lock().unwrap().clone()
    }

    fn privates(&self) -> Vec<String> {
        self.privates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn reply(&self, _channel_id: &str, text: &str) -> QmResult<()> {
        self.replies.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_private(&self, _recipient_id: &str, text: &str) -> QmResult<()> {
        self.privates.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct Deployment {
    router: CommandRouter,
    transport: Arc<RecordingTransport>,
    app: Router,
    ctx: AppContext,
    _data_dir: TempDir,
}

async fn deploy() -> Deployment {
    let data_dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 0,
            version: "0.1.0".to_string(),
        },
        storage: StorageConfig {
            data_directory: data_dir.path().to_path_buf(),
            inventory_db: data_dir.path().join("quartermaster.sqlite"),
        },
        authentication: AuthConfig {
            jwt_secret: "command-flow-test-secret-0123456789abcd".to_string(),
            session_ttl_hours: 12,
            owner_ids: vec![],
            bootstrap_admin: Some(BootstrapAdmin {
                username: "quartermaster".to_string(),
                password: "correct-horse-battery".to_string(),
            }),
        },
        bot: BotConfig {
            default_prefix: "!".to_string(),
            default_cooldown_seconds: 3600,
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            global_requests_per_minute: 3000,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
    };

    let ctx = AppContext::new(config).await.unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let router = CommandRouter::new(
        ctx.config.clone(),
        ctx.engine.clone(),
        ctx.inventory.clone(),
        ctx.settings.clone(),
        ctx.activity.clone(),
        transport.clone(),
    );

    Deployment {
        router,
        transport,
        app: server::build_router(ctx.clone()),
        ctx,
        _data_dir: data_dir,
    }
}

fn guild_msg(author: Requester, content: &str) -> ChatMessage {
    ChatMessage {
        guild_id: Some("guild-1".to_string()),
        channel_id: "chan-1".to_string(),
        author,
        content: content.to_string(),
    }
}

impl Deployment {
    async fn say(&self, author: Requester, content: &str) {
        self.router
            .handle_message(&guild_msg(author, content))
            .await
            .unwrap();
    }

    async fn http(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, body)
    }

    async fn dashboard_token(&self) -> String {
        let (status, body) = self
            .http(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "username": "quartermaster", "password": "correct-horse-battery" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_full_stock_and_claim_cycle_over_chat() {
    let deployment = deploy().await;
    let admin = Requester::new("boss").as_scope_admin();

    deployment
        .say(admin.clone(), "!bulkadd streaming\na@x.com:pw1\nb@x.com:pw2")
        .await;

    // Stocking an unknown category is refused, not auto-created
    let replies = deployment.transport.replies();
    assert!(replies[0].contains("Unknown category 'streaming'"));

    deployment
        .ctx
        .inventory
        .create_category("streaming", None, "boss")
        .await
        .unwrap();
    deployment
        .say(admin.clone(), "!bulkadd streaming\na@x.com:pw1\nb@x.com:pw2")
        .await;
    deployment.say(Requester::new("alice"), "!stock").await;

    // Alice claims, is cooled down, Bob takes the last one, Carol finds
    // the shelf empty
    deployment.say(Requester::new("alice"), "!gen streaming").await;
    deployment.say(Requester::new("alice"), "!gen streaming").await;
    deployment.say(Requester::new("bob"), "!gen streaming").await;
    deployment.say(Requester::new("carol"), "!gen streaming").await;

    // Admin restocks Alice's account; Carol can claim now
    let generated = deployment
        .ctx
        .inventory
        .list_accounts(None, None, 10, 0)
        .await
        .unwrap();
    let alices = generated
        .iter()
        .find(|a| a.generated_by.as_deref() == Some("alice"))
        .unwrap();
    deployment
        .say(admin, &format!("!restock {}", alices.id))
        .await;
    deployment.say(Requester::new("carol"), "!gen streaming").await;

    let replies = deployment.transport.replies();
    assert_eq!(replies.len(), 9);
    assert!(replies[1].contains("Added 2 account(s)"));
    assert!(replies[2].contains("streaming - 2 available"));
    assert!(replies[3].contains("check your private messages"));
    assert!(replies[4].contains("on cooldown"));
    assert!(replies[5].contains("check your private messages"));
    assert!(replies[6].contains("out of stock"));
    assert!(replies[7].contains("Restocked"));
    assert!(replies[8].contains("check your private messages"));

    let privates = deployment.transport.privates();
    assert_eq!(privates.len(), 3);
    assert!(privates.iter().all(|text| text.contains("password")));
}

#[tokio::test]
async fn test_chat_traffic_shows_up_on_the_dashboard() {
    let deployment = deploy().await;
    let admin = Requester::new("boss").as_scope_admin();

    deployment
        .ctx
        .inventory
        .create_category("vpn", None, "boss")
        .await
        .unwrap();
    deployment.say(admin, "!add vpn seat1@vpn.example:pw").await;
    deployment.say(Requester::new("alice"), "!gen vpn").await;

    let token = deployment.dashboard_token().await;

    let (status, stats) = deployment.http("GET", "/api/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_accounts"], 1);
    assert_eq!(stats["generated_accounts"], 1);

    let (status, accounts) = deployment
        .http("GET", "/api/accounts?status=generated", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accounts["accounts"][0]["generated_by"], "alice");

    let (_, activity) = deployment
        .http("GET", "/api/activity", Some(&token), None)
        .await;
    let actions: Vec<&str> = activity["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"ACCOUNT_GENERATED"));
    assert!(actions.contains(&"ACCOUNTS_ADDED"));
}

#[tokio::test]
async fn test_dashboard_stock_is_claimable_over_chat() {
    let deployment = deploy().await;
    let token = deployment.dashboard_token().await;

    let (status, _) = deployment
        .http(
            "POST",
            "/api/categories",
            Some(&token),
            Some(json!({ "name": "games" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = deployment
        .http(
            "POST",
            "/api/accounts",
            Some(&token),
            Some(json!({ "category": "games", "lines": "key1@g.example:pw1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    deployment.say(Requester::new("alice"), "!gen games").await;

    let privates = deployment.transport.privates();
    assert_eq!(privates.len(), 1);
    assert!(privates[0].contains("key1@g.example"));

    // And the dashboard sees the claim
    let (_, stats) = deployment.http("GET", "/api/stats", Some(&token), None).await;
    assert_eq!(stats["available_accounts"], 0);
    assert_eq!(stats["generated_accounts"], 1);
}
