//! End-to-end flow: create a thread, get refused, get approved, post, upload.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;
use threadgate_control::{
    AgentType, ApprovalOutcome, ApprovalPromptResult, ApprovalReply, Bridge, BridgeService,
    CallContext, ChannelId, ChatClient, ChatError, ChatMessage, ControlError, ErrorKind,
    FileAccessError, MessageRef, ResolveError, SqliteSessionStore, ThreadId, ThreadgateConfig,
};

/// Chat double that approves every prompt and remembers where output went.
#[derive(Default)]
struct FakePlatform {
    posts: Mutex<Vec<(String, String)>>,
    next_thread: Mutex<u64>,
}

impl FakePlatform {
    fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().clone()
    }
}

#[async_trait]
impl ChatClient for FakePlatform {
    async fn send_message(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageRef, ChatError> {
        self.posts.lock().push((channel.to_string(), content.to_string()));
        Ok(MessageRef {
            channel_id: channel.clone(),
            message_id: format!("msg-{}", self.posts.lock().len()),
        })
    }

    async fn create_thread(&self, _parent: &ChannelId, _name: &str) -> Result<ThreadId, ChatError> {
        let id = {
            let mut next = self.next_thread.lock();
            *next += 1;
            *next
        };
        ChannelId::parse(format!("90{id}")).map_err(|e| ChatError::Rejected(e.to_string()))
    }

    async fn rename_thread(&self, _thread: &ThreadId, _name: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn fetch_messages(
        &self,
        channel: &ChannelId,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self
            .posts()
            .into_iter()
            .filter(|(c, _)| c == channel.as_str())
            .take(usize::from(limit))
            .enumerate()
            .map(|(i, (_, content))| ChatMessage {
                id: i.to_string(),
                author: "agent".into(),
                content,
                timestamp: Utc::now(),
            })
            .collect())
    }

    async fn send_file(
        &self,
        channel: &ChannelId,
        file_name: &str,
        _data: Vec<u8>,
        _caption: Option<&str>,
    ) -> Result<MessageRef, ChatError> {
        self.posts
            .lock()
            .push((channel.to_string(), format!("file:{file_name}")));
        Ok(MessageRef {
            channel_id: channel.clone(),
            message_id: "upload".into(),
        })
    }

    async fn await_approval(
        &self,
        _channel: &ChannelId,
        _prompt: &str,
    ) -> Result<ApprovalReply, ChatError> {
        Ok(ApprovalReply::Approved)
    }
}

fn build(dir: &TempDir) -> BridgeService<SqliteSessionStore, FakePlatform> {
    let config = ThreadgateConfig {
        db_path: dir.path().join("state/sessions.db"),
        allowed_prefixes: vec![dir.path().join("shared")],
        default_channel: Some(ChannelId::parse("100").unwrap()),
        ..ThreadgateConfig::default()
    };
    std::fs::create_dir_all(dir.path().join("shared")).unwrap();
    BridgeService::open(config, Arc::new(FakePlatform::default())).unwrap()
}

#[tokio::test]
async fn session_lifecycle_through_the_bridge() {
    let dir = TempDir::new().unwrap();
    let bridge = build(&dir);
    let ctx = CallContext::for_session("ses_flow").with_user("42");

    let created = bridge
        .create_thread(None, &ctx, "deploy", AgentType::Project)
        .await
        .unwrap();
    assert_eq!(created.thread_id.as_str(), "901");

    // Unapproved: no explicit target means refusal with an actionable message.
    let err = bridge.send_message(None, &ctx, "status").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Policy);
    assert!(matches!(err, ControlError::Resolve(ResolveError::NotApproved { .. })));
    assert!(err.to_string().contains("ses_flow"));

    // Unapproved with an explicit target posts there.
    bridge
        .send_message(Some(&ChannelId::parse("555").unwrap()), &ctx, "elsewhere")
        .await
        .unwrap();

    let approval = bridge.request_approval(&ctx).await.unwrap();
    assert_eq!(
        approval,
        ApprovalPromptResult::Approved(ApprovalOutcome::Applied { rows: 1 })
    );

    // Approved: the bound thread wins over a different explicit id.
    let sent = bridge
        .send_message(Some(&ChannelId::parse("555").unwrap()), &ctx, "done")
        .await
        .unwrap();
    assert_eq!(sent.channel_id, created.thread_id);

    let history = bridge.read_history(None, &ctx, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "done");

    assert_eq!(
        bridge.chat().posts(),
        vec![
            ("555".to_string(), "elsewhere".to_string()),
            ("901".to_string(), "done".to_string()),
        ]
    );
}

#[tokio::test]
async fn uploads_are_sandboxed() {
    let dir = TempDir::new().unwrap();
    let bridge = build(&dir);
    let ctx = CallContext::default();
    let target = ChannelId::parse("555").unwrap();

    let inside: PathBuf = dir.path().join("shared/report.txt");
    std::fs::write(&inside, b"0123456789").unwrap();
    bridge
        .send_file(Some(&target), &ctx, &inside, None)
        .await
        .unwrap();

    let secret = dir.path().join("secret.txt");
    std::fs::write(&secret, b"keep out").unwrap();
    let link = dir.path().join("shared/innocent.txt");
    std::os::unix::fs::symlink(&secret, &link).unwrap();

    let err = bridge
        .send_file(Some(&target), &ctx, &link, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Security);
    assert!(matches!(
        err,
        ControlError::FileAccess(FileAccessError::OutsideSandbox { .. })
    ));

    assert_eq!(
        bridge.chat().posts(),
        vec![("555".to_string(), "file:report.txt".to_string())]
    );
}

#[tokio::test]
async fn approvals_survive_reopening_the_store() {
    let dir = TempDir::new().unwrap();
    let ctx = CallContext::for_session("ses_persist");

    {
        let bridge = build(&dir);
        bridge
            .create_thread(None, &ctx, "t", AgentType::Ask)
            .await
            .unwrap();
        assert!(bridge.approve_session("ses_persist").await.succeeded());
    }

    let bridge = build(&dir);
    let sent = bridge.send_message(None, &ctx, "hello again").await.unwrap();
    assert_eq!(sent.channel_id.as_str(), "901");
}
