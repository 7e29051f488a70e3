use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use sift_ai::{AiError, ChatRequest, ChatResponse, ChatUsage, LlmClient};
use sift_chat::{
    ChatError, ChatEvent, ChatKind, ChatScope, ChatTarget, DialogFolder, EntityInfo, ForumTopic,
    ForwardedRef, InboundMessage, NotifySettings, PeerRef, ReactionUpdate, SenderInfo,
};
use sift_config::parse_config;
use sift_evals::{generate_datasets, run_accuracy, select_prompt};
use sift_runtime::{
    Monitor, MonitorRuntimeConfig, NoopPromptRegistry, NoopTraceSink, PromptEvaluator,
    SharedStats, POSITIVE_EMOJI,
};
use sift_store::{StatsStore, TraceStore};

const MONITORED_CHAT: i64 = -1_001_000_000_001;
const TARGET_CHAT: i64 = -1_001_000_000_099;

#[derive(Debug, Clone, PartialEq)]
enum Outbound {
    Send(String, String),
    Forward(i64, i64, String),
}

#[derive(Default)]
struct FakeChat {
    entities: Vec<(String, EntityInfo)>,
    histories: Vec<(String, Vec<InboundMessage>)>,
    outbound: Mutex<Vec<Outbound>>,
}

impl FakeChat {
    fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().expect("outbound lock").clone()
    }
}

#[async_trait]
impl sift_chat::ChatClient for FakeChat {
    async fn next_event(&self) -> Result<ChatEvent, ChatError> {
        Err(ChatError::Unsupported("scripted transport has no stream"))
    }

    async fn get_entity(&self, target: &ChatTarget) -> Result<EntityInfo, ChatError> {
        let key = target.to_string();
        self.entities
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, entity)| entity.clone())
            .ok_or_else(|| ChatError::Resolve {
                target: key,
                reason: "not in fixture".to_string(),
            })
    }

    async fn send_message(
        &self,
        target: &ChatTarget,
        text: &str,
        _reply_to: Option<i64>,
    ) -> Result<i64, ChatError> {
        self.outbound
            .lock()
            .expect("outbound lock")
            .push(Outbound::Send(target.to_string(), text.to_string()));
        Ok(1)
    }

    async fn forward_message(
        &self,
        from: PeerRef,
        message_id: i64,
        target: &ChatTarget,
    ) -> Result<Option<ForwardedRef>, ChatError> {
        self.outbound.lock().expect("outbound lock").push(Outbound::Forward(
            sift_chat::canonical_chat_id(from),
            message_id,
            target.to_string(),
        ));
        Ok(None)
    }

    async fn dialog_folders(&self) -> Result<Vec<DialogFolder>, ChatError> {
        Ok(Vec::new())
    }

    async fn notify_settings(&self, _peer: PeerRef) -> Result<NotifySettings, ChatError> {
        Err(ChatError::Unsupported("notify_settings"))
    }

    async fn update_notify_settings(
        &self,
        _peer: PeerRef,
        _settings: NotifySettings,
    ) -> Result<(), ChatError> {
        Err(ChatError::Unsupported("update_notify_settings"))
    }

    async fn forum_topics(&self, _peer: PeerRef, _query: &str) -> Result<Vec<ForumTopic>, ChatError> {
        Err(ChatError::Unsupported("forum_topics"))
    }

    async fn create_forum_topic(&self, _peer: PeerRef, _title: &str) -> Result<(), ChatError> {
        Err(ChatError::Unsupported("create_forum_topic"))
    }

    async fn history(&self, target: &ChatTarget) -> Result<Vec<InboundMessage>, ChatError> {
        let key = target.to_string();
        self.histories
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, messages)| messages.clone())
            .ok_or(ChatError::Unsupported("history"))
    }
}

struct ScriptedLlm {
    responses: Mutex<VecDeque<i64>>,
    calls: Mutex<usize>,
}

impl ScriptedLlm {
    fn new(scores: Vec<i64>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(scores)),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, AiError> {
        *self.calls.lock().expect("calls lock") += 1;
        let score = self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| AiError::InvalidResponse("scripted score queue exhausted".into()))?;
        Ok(ChatResponse {
            content: format!(r#"{{"score":{score},"quote":"fragment","reasoning":"because"}}"#),
            finish_reason: Some("stop".to_string()),
            usage: ChatUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
        })
    }
}

fn message(id: i64, text: Option<&str>) -> ChatEvent {
    ChatEvent::Message(InboundMessage {
        id,
        chat: ChatScope {
            id: MONITORED_CHAT,
            kind: ChatKind::Channel,
            title: Some("Listings".to_string()),
            username: None,
        },
        sender: Some(SenderInfo {
            id: Some(7),
            username: Some("someone".to_string()),
        }),
        text: text.map(str::to_string),
    })
}

fn monitor_with(
    yaml: &str,
    chat: Arc<FakeChat>,
    llm: Option<Arc<dyn LlmClient>>,
    data_dir: &tempfile::TempDir,
) -> Monitor {
    let mut config = parse_config(yaml).expect("config must parse");
    config.data_dir = data_dir.path().to_path_buf();
    Monitor::new(MonitorRuntimeConfig {
        chat,
        llm,
        registry: Arc::new(NoopPromptRegistry),
        sink: Arc::new(NoopTraceSink),
        config,
        config_path: PathBuf::from("unused.yml"),
    })
}

const PIPELINE_CONFIG: &str = r#"
instances:
  - name: flats
    words: [rent]
    ignore_words: [spam]
    chat_ids: [-1001000000001]
    target_chat: -1001000000099
    true_positive_entity: "@tp"
    false_positive_entity: "@fp"
    prompts:
      - name: housing
        prompt: "housing offers"
        threshold: 4
      - name: fallback
        prompt: "generic fallback"
        threshold: 2
"#;

#[tokio::test]
async fn integration_word_match_forwards_with_annotation_and_counters() {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(FakeChat::default());
    let llm = Arc::new(ScriptedLlm::new(Vec::new()));
    let monitor = monitor_with(PIPELINE_CONFIG, chat.clone(), Some(llm.clone()), &data_dir);

    monitor
        .handle_event(message(11, Some("Great RENT offer downtown")))
        .await;

    let outbound = chat.outbound();
    assert_eq!(outbound.len(), 2);
    match &outbound[0] {
        Outbound::Send(target, text) => {
            assert_eq!(target, &TARGET_CHAT.to_string());
            assert!(text.starts_with("word: rent\n\n"));
            assert!(text.contains("Forwarded from:"));
        }
        other => panic!("expected annotation first, got {other:?}"),
    }
    assert_eq!(
        outbound[1],
        Outbound::Forward(MONITORED_CHAT, 11, TARGET_CHAT.to_string())
    );
    // Keyword match must not consult the evaluator at all.
    assert_eq!(*llm.calls.lock().expect("calls lock"), 0);

    let (total, by_word, by_prompt) = monitor
        .stats()
        .with_snapshot(|snapshot| {
            (
                snapshot.stats.total,
                snapshot.stats.forwarded_words,
                snapshot.stats.forwarded_prompt,
            )
        })
        .expect("snapshot");
    assert_eq!((total, by_word, by_prompt), (1, 1, 0));
}

#[tokio::test]
async fn integration_prompt_scan_early_exits_and_tracks_tokens() {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(FakeChat::default());
    // First prompt scores below its threshold, second crosses it; a third
    // score would mean the early exit failed.
    let llm = Arc::new(ScriptedLlm::new(vec![3, 5]));
    let monitor = monitor_with(PIPELINE_CONFIG, chat.clone(), Some(llm.clone()), &data_dir);

    monitor
        .handle_event(message(12, Some("spacious flat near the park")))
        .await;

    assert_eq!(*llm.calls.lock().expect("calls lock"), 2);
    let outbound = chat.outbound();
    assert_eq!(outbound.len(), 2);
    match &outbound[0] {
        Outbound::Send(_, text) => {
            assert!(text.starts_with("fallback: 5/5 - `fragment`"), "got: {text}");
            assert!(text.contains("because"));
        }
        other => panic!("expected annotation first, got {other:?}"),
    }

    let (by_prompt, tokens) = monitor
        .stats()
        .with_snapshot(|snapshot| (snapshot.stats.forwarded_prompt, snapshot.stats.tokens))
        .expect("snapshot");
    assert_eq!(by_prompt, 1);
    assert_eq!(tokens, 30);
}

#[tokio::test]
async fn integration_reaction_feedback_captured_once_per_polarity() {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(FakeChat::default());
    let monitor = monitor_with(PIPELINE_CONFIG, chat.clone(), None, &data_dir);

    let reaction = ChatEvent::Reactions(ReactionUpdate {
        chat: ChatScope {
            id: TARGET_CHAT,
            kind: ChatKind::Channel,
            title: None,
            username: None,
        },
        message_id: 42,
        added: vec![POSITIVE_EMOJI.to_string()],
    });
    monitor.handle_event(reaction.clone()).await;
    monitor.handle_event(reaction).await;

    assert_eq!(
        chat.outbound(),
        vec![Outbound::Forward(TARGET_CHAT, 42, "@tp".to_string())]
    );
}

#[tokio::test]
async fn integration_stats_survive_flush_and_reload() {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(FakeChat::default());
    let monitor = monitor_with(PIPELINE_CONFIG, chat.clone(), None, &data_dir);

    monitor.handle_event(message(13, Some("rent this"))).await;
    monitor.handle_event(message(14, Some("nothing"))).await;
    monitor.stats().flush().expect("flush");

    let reloaded = StatsStore::load(data_dir.path().join("stats.json"), Duration::ZERO);
    let snapshot = reloaded.snapshot();
    assert_eq!(snapshot.stats.total, 2);
    assert_eq!(snapshot.stats.forwarded_total, 1);
    assert_eq!(snapshot.instances[0].name, "flats");
    assert_eq!(snapshot.instances[0].stats.forwarded_words, 1);
}

#[tokio::test]
async fn integration_dataset_generation_feeds_eval_runner() {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let mut config = parse_config(PIPELINE_CONFIG).expect("config must parse");
    config.data_dir = data_dir.path().to_path_buf();

    let labeled = |chat_id: i64, id: i64, text: &str| InboundMessage {
        id,
        chat: ChatScope {
            id: chat_id,
            kind: ChatKind::Channel,
            title: None,
            username: None,
        },
        sender: None,
        text: Some(text.to_string()),
    };
    let chat = Arc::new(FakeChat {
        histories: vec![
            (
                "@tp".to_string(),
                vec![labeled(-300, 1, "genuine housing offer")],
            ),
            ("@fp".to_string(), vec![labeled(-301, 2, "crypto spam")]),
        ],
        ..FakeChat::default()
    });
    let traces = TraceStore::load(data_dir.path().join("trace_ids.json"), Duration::ZERO);
    generate_datasets(chat, &config, &traces, "round1")
        .await
        .expect("generate datasets");

    let (instance, prompt) = select_prompt(&config, "flats", "housing").expect("select");
    let dataset = sift_evals::eval_dir(&config.evals_dir(), "flats", "housing", "round1")
        .join("messages.jsonl");

    // Scores agree with both labels: 5 -> match, 1 -> no match.
    let stats = SharedStats::new(StatsStore::load(
        data_dir.path().join("eval-stats.json"),
        Duration::MAX,
    ));
    let evaluator = PromptEvaluator::new(
        Some(Arc::new(ScriptedLlm::new(vec![5, 1]))),
        "gpt-4.1-mini",
        stats,
        Arc::new(NoopTraceSink),
    );
    let outcome = run_accuracy(&evaluator, &instance, &prompt, &dataset)
        .await
        .expect("run accuracy");
    assert_eq!(outcome.total, 2);
    assert_eq!(outcome.correct, 2);
    assert!(outcome.passed());
}
