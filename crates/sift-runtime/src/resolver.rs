use std::collections::HashSet;
use std::sync::Arc;

use sift_chat::{
    canonical_chat_id, ChatClient, ChatTarget, DialogFolder, NameResolver, NotifySettings,
    MUTE_FOREVER,
};
use sift_config::TopicSpec;
use tracing::{debug, error, info};

use crate::instance::Instance;

/// Recomputes each instance's effective chat-id set from folders, seed ids,
/// and raw entity references, all normalized to canonical marked ids.
///
/// Refreshes are monotonic: ids already known to an instance are never
/// dropped, so removing a chat from a folder does not silently unsubscribe.
/// Every per-folder and per-entity failure is logged and skipped.
#[derive(Clone)]
pub struct ChatIdResolver {
    client: Arc<dyn ChatClient>,
    names: Arc<NameResolver>,
}

impl ChatIdResolver {
    pub fn new(client: Arc<dyn ChatClient>, names: Arc<NameResolver>) -> Self {
        Self { client, names }
    }

    pub async fn refresh(&self, instance: &mut Instance, first_run: bool) {
        let mut ids = self.folder_chat_ids(&instance.folders).await;
        ids.extend(instance.chat_ids.iter().copied());
        ids.extend(self.resolve_entities(&instance.entities).await);
        instance.chat_ids = self.normalize_chat_ids(ids).await;

        if instance.folder_mute {
            self.mute_chats_from_folders(&instance.folders).await;
        }
        if !instance.folder_add_topic.is_empty() {
            self.add_topics_from_folders(&instance.folders, &instance.folder_add_topic)
                .await;
        }

        if first_run {
            info!(
                instance = %instance.name,
                chats = instance.chat_ids.len(),
                folders = instance.folders.len(),
                entities = instance.entities.len(),
                "instance listening"
            );
        } else {
            debug!(
                instance = %instance.name,
                chats = instance.chat_ids.len(),
                folders = instance.folders.len(),
                entities = instance.entities.len(),
                "instance rescanned"
            );
        }
    }

    async fn named_folders(&self, folder_names: &[String]) -> Vec<DialogFolder> {
        if folder_names.is_empty() {
            return Vec::new();
        }
        let all = match self.client.dialog_folders().await {
            Ok(folders) => folders,
            Err(error) => {
                error!(%error, "failed to list dialog folders");
                return Vec::new();
            }
        };
        folder_names
            .iter()
            .filter_map(|name| {
                let found = all.iter().find(|folder| folder.title == *name).cloned();
                if found.is_none() {
                    debug!(folder = %name, "configured folder not found");
                }
                found
            })
            .collect()
    }

    async fn folder_chat_ids(&self, folder_names: &[String]) -> HashSet<i64> {
        let mut ids = HashSet::new();
        for folder in self.named_folders(folder_names).await {
            for peer in &folder.include_peers {
                ids.insert(canonical_chat_id(*peer));
            }
        }
        ids
    }

    async fn resolve_entities(&self, entities: &[String]) -> HashSet<i64> {
        let mut ids = HashSet::new();
        for entity in entities {
            match self
                .names
                .target_chat_id(&ChatTarget::Name(entity.clone()))
                .await
            {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(error) => error!(entity = %entity, %error, "failed to resolve entity"),
            }
        }
        ids
    }

    /// Positive bare ids are resolved through the transport to learn their
    /// kind; unresolvable ones fall back to the negated id so a configured
    /// group keeps working offline.
    async fn normalize_chat_ids(&self, ids: HashSet<i64>) -> HashSet<i64> {
        let mut normalized = HashSet::new();
        for id in ids {
            if id <= 0 {
                normalized.insert(id);
                continue;
            }
            match self.names.entity(&ChatTarget::Chat(id)).await {
                Ok(entity) => {
                    normalized.insert(entity.id);
                }
                Err(error) => {
                    error!(peer = id, %error, "failed to resolve peer, assuming group");
                    normalized.insert(-id);
                }
            }
        }
        normalized
    }

    async fn mute_chats_from_folders(&self, folder_names: &[String]) {
        for folder in self.named_folders(folder_names).await {
            for peer in &folder.include_peers {
                self.mute_peer(*peer).await;
            }
        }
    }

    /// Checks the current mute state first so unchanged peers do not get a
    /// redundant settings write.
    async fn mute_peer(&self, peer: sift_chat::PeerRef) {
        match self.client.notify_settings(peer).await {
            Ok(settings) if settings.mute_until == Some(MUTE_FOREVER) => {}
            Ok(_) => {
                if let Err(error) = self
                    .client
                    .update_notify_settings(
                        peer,
                        NotifySettings {
                            mute_until: Some(MUTE_FOREVER),
                        },
                    )
                    .await
                {
                    error!(?peer, %error, "failed to mute peer");
                }
            }
            Err(error) => error!(?peer, %error, "failed to read notify settings"),
        }
    }

    async fn add_topics_from_folders(&self, folder_names: &[String], topics: &[TopicSpec]) {
        for folder in self.named_folders(folder_names).await {
            for peer in &folder.include_peers {
                let chat_id = canonical_chat_id(*peer);
                let entity = match self.names.entity(&ChatTarget::Chat(chat_id)).await {
                    Ok(entity) => entity,
                    Err(error) => {
                        error!(chat = chat_id, %error, "failed to resolve folder peer");
                        continue;
                    }
                };
                if !entity.is_forum {
                    continue;
                }
                for topic in topics {
                    self.ensure_topic(&entity, chat_id, topic).await;
                }
            }
        }
    }

    async fn ensure_topic(&self, entity: &sift_chat::EntityInfo, chat_id: i64, topic: &TopicSpec) {
        match self.client.forum_topics(entity.peer(), &topic.name).await {
            Ok(existing) if existing.iter().any(|found| found.title == topic.name) => return,
            Ok(_) => {}
            Err(error) => {
                error!(chat = chat_id, %error, "failed to fetch forum topics");
                return;
            }
        }
        if let Err(error) = self
            .client
            .create_forum_topic(entity.peer(), &topic.name)
            .await
        {
            error!(chat = chat_id, topic = %topic.name, %error, "failed to create topic");
            return;
        }
        let created = self
            .client
            .forum_topics(entity.peer(), &topic.name)
            .await
            .ok()
            .and_then(|found| found.into_iter().find(|candidate| candidate.title == topic.name));
        let thread_id = created
            .as_ref()
            .map(|created| created.top_message.unwrap_or(created.id));
        if let (Some(message), Some(thread_id)) = (topic.message.as_deref(), thread_id) {
            if let Err(error) = self
                .client
                .send_message(&ChatTarget::Chat(chat_id), message, Some(thread_id))
                .await
            {
                error!(chat = chat_id, topic = %topic.name, %error, "failed to seed topic");
            }
        }
        info!(chat = chat_id, thread = ?thread_id, topic = %topic.name, "added topic");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use sift_chat::{
        ChatError, ChatEvent, ChatKind, ChatTarget, DialogFolder, EntityInfo, ForumTopic,
        ForwardedRef, InboundMessage, NameResolver, NotifySettings, PeerRef, MUTE_FOREVER,
    };
    use sift_config::{InstanceSpec, TopicSpec};

    use super::ChatIdResolver;
    use crate::instance::Instance;

    #[derive(Default)]
    struct FolderClient {
        folders: Vec<DialogFolder>,
        entities: Vec<(String, EntityInfo)>,
        muted: Mutex<HashSet<i64>>,
        mute_writes: Mutex<Vec<i64>>,
        topics: Mutex<Vec<(i64, String)>>,
        seeded: Mutex<Vec<(i64, i64, String)>>,
        folders_fail: bool,
    }

    #[async_trait]
    impl sift_chat::ChatClient for FolderClient {
        async fn next_event(&self) -> Result<ChatEvent, ChatError> {
            Err(ChatError::Unsupported("events"))
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
            reply_to: Option<i64>,
        ) -> Result<i64, ChatError> {
            if let (ChatTarget::Chat(chat_id), Some(thread)) = (target, reply_to) {
                self.seeded
                    .lock()
                    .expect("lock")
                    .push((*chat_id, thread, text.to_string()));
            }
            Ok(1)
        }

        async fn forward_message(
            &self,
            _from: PeerRef,
            _message_id: i64,
            _target: &ChatTarget,
        ) -> Result<Option<ForwardedRef>, ChatError> {
            Err(ChatError::Unsupported("forward_message"))
        }

        async fn dialog_folders(&self) -> Result<Vec<DialogFolder>, ChatError> {
            if self.folders_fail {
                return Err(ChatError::Unsupported(
                    "dialog folders require a user-session transport",
                ));
            }
            Ok(self.folders.clone())
        }

        async fn notify_settings(&self, peer: PeerRef) -> Result<NotifySettings, ChatError> {
            let id = sift_chat::canonical_chat_id(peer);
            let muted = self.muted.lock().expect("lock").contains(&id);
            Ok(NotifySettings {
                mute_until: muted.then_some(MUTE_FOREVER),
            })
        }

        async fn update_notify_settings(
            &self,
            peer: PeerRef,
            settings: NotifySettings,
        ) -> Result<(), ChatError> {
            let id = sift_chat::canonical_chat_id(peer);
            self.mute_writes.lock().expect("lock").push(id);
            if settings.mute_until == Some(MUTE_FOREVER) {
                self.muted.lock().expect("lock").insert(id);
            }
            Ok(())
        }

        async fn forum_topics(
            &self,
            peer: PeerRef,
            query: &str,
        ) -> Result<Vec<ForumTopic>, ChatError> {
            let chat_id = sift_chat::canonical_chat_id(peer);
            Ok(self
                .topics
                .lock()
                .expect("lock")
                .iter()
                .filter(|(topic_chat, title)| *topic_chat == chat_id && title == query)
                .enumerate()
                .map(|(index, (_, title))| ForumTopic {
                    id: index as i64 + 1,
                    title: title.clone(),
                    top_message: Some(100 + index as i64),
                })
                .collect())
        }

        async fn create_forum_topic(&self, peer: PeerRef, title: &str) -> Result<(), ChatError> {
            let chat_id = sift_chat::canonical_chat_id(peer);
            self.topics
                .lock()
                .expect("lock")
                .push((chat_id, title.to_string()));
            Ok(())
        }

        async fn history(&self, _target: &ChatTarget) -> Result<Vec<InboundMessage>, ChatError> {
            Err(ChatError::Unsupported("history"))
        }
    }

    fn forum_entity(id: i64, is_forum: bool) -> EntityInfo {
        EntityInfo {
            id,
            kind: ChatKind::Channel,
            title: Some("Ops".to_string()),
            username: None,
            first_name: None,
            last_name: None,
            is_forum,
        }
    }

    fn resolver(client: Arc<FolderClient>) -> ChatIdResolver {
        let names = Arc::new(NameResolver::new(client.clone()));
        ChatIdResolver::new(client, names)
    }

    fn housing_folder() -> DialogFolder {
        DialogFolder {
            title: "Housing".to_string(),
            include_peers: vec![PeerRef::Channel(1_000_000_001), PeerRef::Group(9)],
        }
    }

    #[tokio::test]
    async fn functional_refresh_unions_folders_seeds_and_entities() {
        let client = Arc::new(FolderClient {
            folders: vec![housing_folder()],
            entities: vec![(
                "@forwards".to_string(),
                forum_entity(-1_001_000_000_777, false),
            )],
            ..FolderClient::default()
        });
        let resolver = resolver(client);
        let mut instance = Instance::from_spec(InstanceSpec {
            name: "alerts".to_string(),
            folders: vec!["Housing".to_string()],
            entities: vec!["@forwards".to_string()],
            chat_ids: vec![-555],
            ..InstanceSpec::default()
        });

        resolver.refresh(&mut instance, true).await;
        for id in [-1_001_000_000_001, -9, -555, -1_001_000_000_777] {
            assert!(instance.chat_ids.contains(&id), "missing {id}");
        }
    }

    #[tokio::test]
    async fn regression_refresh_is_monotonic_when_folder_shrinks() {
        let client = Arc::new(FolderClient {
            folders: vec![housing_folder()],
            ..FolderClient::default()
        });
        let resolver = resolver(client);
        let mut instance = Instance::from_spec(InstanceSpec {
            name: "alerts".to_string(),
            folders: vec!["Housing".to_string()],
            ..InstanceSpec::default()
        });
        resolver.refresh(&mut instance, true).await;
        let first = instance.chat_ids.clone();

        // The same membership and a second refresh never removes ids.
        resolver.refresh(&mut instance, false).await;
        assert!(instance.chat_ids.is_superset(&first));
    }

    #[tokio::test]
    async fn regression_folder_listing_failure_keeps_seed_ids() {
        let client = Arc::new(FolderClient {
            folders_fail: true,
            ..FolderClient::default()
        });
        let resolver = resolver(client);
        let mut instance = Instance::from_spec(InstanceSpec {
            name: "alerts".to_string(),
            folders: vec!["Housing".to_string()],
            chat_ids: vec![-555],
            ..InstanceSpec::default()
        });
        resolver.refresh(&mut instance, true).await;
        assert!(instance.chat_ids.contains(&-555));
    }

    #[tokio::test]
    async fn unit_normalize_resolves_positive_ids_with_group_fallback() {
        let client = Arc::new(FolderClient {
            entities: vec![("777".to_string(), forum_entity(-1_001_000_000_777, false))],
            ..FolderClient::default()
        });
        let resolver = resolver(client);
        let mut instance = Instance::from_spec(InstanceSpec {
            name: "alerts".to_string(),
            chat_ids: vec![777, 888],
            ..InstanceSpec::default()
        });
        resolver.refresh(&mut instance, true).await;
        assert!(instance.chat_ids.contains(&-1_001_000_000_777));
        assert!(instance.chat_ids.contains(&-888));
        assert!(!instance.chat_ids.contains(&777));
    }

    #[tokio::test]
    async fn functional_folder_mute_skips_already_muted_peers() {
        let client = Arc::new(FolderClient {
            folders: vec![housing_folder()],
            ..FolderClient::default()
        });
        client
            .muted
            .lock()
            .expect("lock")
            .insert(-1_001_000_000_001);
        let resolver = resolver(client.clone());
        let mut instance = Instance::from_spec(InstanceSpec {
            name: "alerts".to_string(),
            folders: vec!["Housing".to_string()],
            folder_mute: true,
            ..InstanceSpec::default()
        });
        resolver.refresh(&mut instance, true).await;

        // Only the unmuted group peer got a settings write.
        assert_eq!(*client.mute_writes.lock().expect("lock"), vec![-9]);
    }

    #[tokio::test]
    async fn functional_missing_topics_created_once_and_seeded() {
        let forum_id = -1_001_000_000_001;
        let client = Arc::new(FolderClient {
            folders: vec![DialogFolder {
                title: "Housing".to_string(),
                include_peers: vec![PeerRef::Channel(1_000_000_001)],
            }],
            entities: vec![(forum_id.to_string(), forum_entity(forum_id, true))],
            ..FolderClient::default()
        });
        let resolver = resolver(client.clone());
        let mut instance = Instance::from_spec(InstanceSpec {
            name: "alerts".to_string(),
            folders: vec!["Housing".to_string()],
            folder_add_topic: vec![TopicSpec {
                name: "leads".to_string(),
                message: Some("pinned intro".to_string()),
            }],
            ..InstanceSpec::default()
        });

        resolver.refresh(&mut instance, true).await;
        assert_eq!(
            *client.topics.lock().expect("lock"),
            vec![(forum_id, "leads".to_string())]
        );
        assert_eq!(
            *client.seeded.lock().expect("lock"),
            vec![(forum_id, 100, "pinned intro".to_string())]
        );

        // Second refresh finds the topic and does not create a duplicate.
        resolver.refresh(&mut instance, false).await;
        assert_eq!(client.topics.lock().expect("lock").len(), 1);
        assert_eq!(client.seeded.lock().expect("lock").len(), 1);
    }
}
