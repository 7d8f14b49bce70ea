//! Ask a question and keep the answer.
//!
//! `ConversationService` runs the full round trip: send the request, assemble
//! the reply (streamed or not), then persist the finished message into the
//! active session of the chat area or of one assistant. Nothing is written
//! until the response is complete, so a failed or cancelled stream never
//! leaves a partial message.

use crate::assistant::AssistantStore;
use crate::session::SessionManager;
use parley_core::error::{ParleyError, Result};
use parley_core::namespace;
use parley_core::record::{ChatResponse, DbMessage, DbObject, SessionConfig, TokenUsage};
use parley_core::store::{Document, RecordStore};
use parley_core::stream::{
    AssembledResponse, AssemblerState, LeadingDebounce, StreamSnapshot, drive_stream,
    parse_complete_response,
};
use parley_core::transport::{ChatRequest, ChatTransport, TransportResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Result of a successful [`ConversationService::ask`].
#[derive(Debug, Clone)]
pub struct AskOutcome {
    /// The session the answer was stored in
    pub session_id: String,
    pub response: ChatResponse,
    /// True when the session was started by this call
    pub created: bool,
}

/// Which sessions an answer may land in.
enum Scope<'a> {
    Chat,
    Owner(&'a str),
}

impl Scope<'_> {
    fn accepts(&self, session_id: &str) -> bool {
        match self {
            Self::Chat => true,
            Self::Owner(owner_id) => namespace::is_session_of(session_id, owner_id),
        }
    }

    /// Key for a new session; `None` lets the store pick one.
    fn new_key<C: Document + Default>(&self) -> Option<String> {
        match self {
            Self::Chat => None,
            Self::Owner(owner_id) => Some(namespace::session_key(
                owner_id,
                &RecordStore::<ChatResponse, C>::new_id(),
            )),
        }
    }
}

pub struct ConversationService {
    transport: Arc<dyn ChatTransport>,
    sessions: SessionManager<ChatResponse, SessionConfig>,
    assistants: AssistantStore,
    debounce_window: Duration,
}

impl ConversationService {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        sessions: SessionManager<ChatResponse, SessionConfig>,
        assistants: AssistantStore,
        debounce_window: Duration,
    ) -> Self {
        Self {
            transport,
            sessions,
            assistants,
            debounce_window,
        }
    }

    pub fn sessions(&self) -> &SessionManager<ChatResponse, SessionConfig> {
        &self.sessions
    }

    pub fn assistants(&self) -> &AssistantStore {
        &self.assistants
    }

    /// Sends `question` and stores the answer in the active chat session.
    ///
    /// Progress is published through `updates`; the last value sent is the
    /// final snapshot, successful or not. When no session is active a new
    /// one is created and made active. If the active session was deleted in
    /// the meantime the answer goes into a fresh session instead.
    ///
    /// # Errors
    ///
    /// - [`ParleyError::Invalid`] for a blank question
    /// - [`ParleyError::Stream`] / [`ParleyError::RequestFailed`] when the
    ///   backend fails
    /// - [`ParleyError::Cancelled`] when `cancel` fires first
    /// - store errors when the finished answer cannot be saved
    pub async fn ask(
        &self,
        question: &str,
        config: &SessionConfig,
        stream: bool,
        updates: &watch::Sender<StreamSnapshot>,
        cancel: &CancellationToken,
    ) -> Result<AskOutcome> {
        let (question, response) = self.answer(question, config, stream, updates, cancel).await?;
        let message = DbMessage::new(question, response.clone());
        let (record, created) = persist(&self.sessions, message, config, Scope::Chat).await?;
        Ok(outcome(record, response, created))
    }

    /// Sends `question` with the settings of assistant `owner_id` and stores
    /// the answer in the assistant's active session (`CHAT_<owner>_<id>`).
    ///
    /// An active session of another owner is left alone; a new session of
    /// `owner_id` is started and made active instead.
    ///
    /// # Errors
    ///
    /// As [`Self::ask`], plus [`ParleyError::NotFound`] when the assistant
    /// has no configuration.
    pub async fn ask_assistant(
        &self,
        owner_id: &str,
        question: &str,
        stream: bool,
        updates: &watch::Sender<StreamSnapshot>,
        cancel: &CancellationToken,
    ) -> Result<AskOutcome> {
        namespace::validate_owner_id(owner_id)?;
        let config = self
            .assistants
            .config(owner_id)
            .await
            .ok_or_else(|| ParleyError::not_found("Assistant", owner_id))?;

        let (question, response) = self
            .answer(question, &config.session, stream, updates, cancel)
            .await?;
        let message = DbMessage::new(question, response.clone());
        let (record, created) = persist(
            self.assistants.sessions(),
            message,
            &config,
            Scope::Owner(owner_id),
        )
        .await?;
        Ok(outcome(record, response, created))
    }

    /// Runs the request and returns the trimmed question with its answer.
    async fn answer<'q>(
        &self,
        question: &'q str,
        config: &SessionConfig,
        stream: bool,
        updates: &watch::Sender<StreamSnapshot>,
        cancel: &CancellationToken,
    ) -> Result<(&'q str, ChatResponse)> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ParleyError::invalid("question must not be empty"));
        }

        let request = ChatRequest::from_session(question, config, stream);
        let assembled = self.receive(&request, updates, cancel).await?;

        let response = ChatResponse::from(assembled);
        if response.is_placeholder() {
            return Err(ParleyError::stream("backend returned an empty answer"));
        }
        Ok((question, response))
    }

    async fn receive(
        &self,
        request: &ChatRequest,
        updates: &watch::Sender<StreamSnapshot>,
        cancel: &CancellationToken,
    ) -> Result<AssembledResponse> {
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ParleyError::Cancelled),
            reply = self.transport.send(request) => reply?,
        };

        match reply {
            TransportResponse::Streamed(bytes) => {
                let mut debounce = LeadingDebounce::new(self.debounce_window);
                drive_stream(bytes, updates, cancel, &mut debounce).await
            }
            TransportResponse::Complete { status, body } => {
                let parsed = parse_complete_response(status, &body);
                updates.send_replace(final_snapshot(&parsed));
                parsed
            }
        }
    }
}

/// Appends `message` to the active session when `scope` accepts it,
/// otherwise starts a new session and makes it active.
async fn persist<C: Document + Default>(
    sessions: &SessionManager<ChatResponse, C>,
    message: DbMessage<ChatResponse>,
    config: &C,
    scope: Scope<'_>,
) -> Result<(DbObject<ChatResponse, C>, bool)> {
    let store = sessions.store();

    if let Some(id) = sessions.active_session().await.filter(|id| scope.accepts(id)) {
        match store
            .append_message(&id, message.clone(), Some(config.clone()))
            .await
        {
            Ok(record) => return Ok((record, false)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(session_id = %id, "Active session vanished; starting a new one");
            }
            Err(e) => return Err(e),
        }
    }

    let id = store
        .create(Some(vec![message]), Some(config.clone()), scope.new_key::<C>())
        .await?;
    sessions.set_active(Some(id.clone())).await;
    let record = store
        .get(&id)
        .await?
        .ok_or_else(|| ParleyError::not_found("Session", &id))?;
    Ok((record, true))
}

fn outcome<C>(record: DbObject<ChatResponse, C>, response: ChatResponse, created: bool) -> AskOutcome {
    tracing::info!(
        session_id = %record.id,
        created,
        tokens = response.tokens,
        messages = record.messages.len(),
        "Stored answer"
    );
    AskOutcome {
        session_id: record.id,
        response,
        created,
    }
}

fn final_snapshot(result: &Result<AssembledResponse>) -> StreamSnapshot {
    match result {
        Ok(response) => StreamSnapshot {
            state: AssemblerState::Complete,
            answer: response.answer.clone(),
            tokens: response.tokens,
            user_tokens: response.user_tokens,
            error: None,
        },
        Err(e) => StreamSnapshot {
            state: AssemblerState::Failed,
            error: Some(e.to_string()),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use parley_core::backend::{CollectionBackend, MemoryCollection};
    use parley_core::clock::ManualClock;
    use parley_core::record::AssistantConfig;
    use parley_core::store_config::StoreConfig;
    use std::sync::Mutex;

    /// Replays canned replies and records what was asked.
    struct ScriptedTransport {
        replies: Mutex<Vec<Reply>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    enum Reply {
        Lines(Vec<&'static str>),
        Pending,
        Complete(u16, &'static str),
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(&self, request: &ChatRequest) -> Result<TransportResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self.replies.lock().unwrap().remove(0);
            Ok(match reply {
                Reply::Lines(lines) => {
                    let parts: Vec<Result<Bytes>> = lines
                        .into_iter()
                        .map(|l| Ok(Bytes::from(format!("{l}\n"))))
                        .collect();
                    TransportResponse::Streamed(futures::stream::iter(parts).boxed())
                }
                Reply::Pending => TransportResponse::Streamed(futures::stream::pending().boxed()),
                Reply::Complete(status, body) => TransportResponse::Complete {
                    status,
                    body: body.to_string(),
                },
            })
        }
    }

    const HELLO: [&str; 3] = [
        r#"{"type":"C","message":"Hel","order":0}"#,
        r#"{"type":"C","message":"lo","order":1}"#,
        r#"{"type":"I","message":{"requesttokens":4,"streamedtokens":2},"order":2}"#,
    ];

    fn service(replies: Vec<Reply>) -> (ConversationService, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new(replies);
        let backend: Arc<dyn CollectionBackend> =
            Arc::new(MemoryCollection::new(StoreConfig::new("chat", 2, "sessions")));
        let store = RecordStore::new(backend, Arc::new(ManualClock::new(0)));
        let sessions = SessionManager::new(store, "New chat");
        let backend: Arc<dyn CollectionBackend> =
            Arc::new(MemoryCollection::new(StoreConfig::new("assistants", 1, "assistants")));
        let assistants = AssistantStore::new(
            RecordStore::new(backend, Arc::new(ManualClock::new(0))),
            "New chat",
        );
        let service = ConversationService::new(transport.clone(), sessions, assistants, Duration::ZERO);
        (service, transport)
    }

    async fn ask(
        service: &ConversationService,
        question: &str,
        stream: bool,
    ) -> (Result<AskOutcome>, StreamSnapshot) {
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let result = service
            .ask(question, &SessionConfig::default(), stream, &tx, &CancellationToken::new())
            .await;
        let last = rx.borrow().clone();
        (result, last)
    }

    #[tokio::test]
    async fn test_streamed_answer_starts_session() {
        let (service, transport) = service(vec![Reply::Lines(HELLO.to_vec())]);
        let (result, last) = ask(&service, "  hi  ", true).await;
        let outcome = result.unwrap();

        assert!(outcome.created);
        assert_eq!(outcome.response, ChatResponse::new("Hello", 2, 4));
        assert_eq!(last.state, AssemblerState::Complete);
        assert_eq!(last.answer, "Hello");

        let record = service.sessions().get(&outcome.session_id).await.unwrap();
        assert_eq!(record.messages, vec![DbMessage::new("hi", ChatResponse::new("Hello", 2, 4))]);
        assert_eq!(service.sessions().active_session().await, Some(outcome.session_id));
        assert_eq!(transport.requests.lock().unwrap()[0].question, "hi");
    }

    #[tokio::test]
    async fn test_second_question_appends_to_active_session() {
        let (service, _) = service(vec![
            Reply::Lines(HELLO.to_vec()),
            Reply::Complete(200, r#"{"answer":"again","tokens":1,"user_tokens":1}"#),
        ]);
        let first = ask(&service, "one", true).await.0.unwrap();
        let second = ask(&service, "two", false).await.0.unwrap();

        assert!(!second.created);
        assert_eq!(first.session_id, second.session_id);
        let record = service.sessions().get(&first.session_id).await.unwrap();
        let users: Vec<&str> = record.messages.iter().map(|m| m.user.as_str()).collect();
        assert_eq!(users, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_stream_error_persists_nothing() {
        let (service, _) = service(vec![Reply::Lines(vec![
            r#"{"type":"C","message":"partial","order":0}"#,
            r#"{"type":"E","message":"model overloaded","order":1}"#,
        ])]);
        let (result, last) = ask(&service, "hi", true).await;

        assert!(result.unwrap_err().is_stream());
        assert_eq!(last.state, AssemblerState::Failed);
        assert_eq!(last.error.as_deref(), Some("model overloaded"));
        assert_eq!(service.sessions().active_session().await, None);
        assert!(service.sessions().store().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_request_persists_nothing() {
        let (service, _) = service(vec![Reply::Complete(500, r#"{"error":"boom"}"#)]);
        let (result, last) = ask(&service, "hi", false).await;

        assert!(matches!(
            result,
            Err(ParleyError::RequestFailed { status: 500, .. })
        ));
        assert_eq!(last.state, AssemblerState::Failed);
        assert!(service.sessions().store().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_is_rejected() {
        let (service, _) = service(vec![Reply::Complete(200, r#"{"answer":""}"#)]);
        let (result, _) = ask(&service, "hi", false).await;
        assert!(result.unwrap_err().is_stream());
        assert!(service.sessions().store().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_stream() {
        let (service, _) = service(vec![Reply::Pending]);
        let (tx, _rx) = watch::channel(StreamSnapshot::default());
        let cancel = CancellationToken::new();
        let config = SessionConfig::default();

        let canceller = cancel.clone();
        let (result, ()) = tokio::join!(
            service.ask("hi", &config, true, &tx, &cancel),
            async move { canceller.cancel() }
        );

        assert!(result.unwrap_err().is_cancelled());
        assert!(service.sessions().store().get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_active_session_gets_replaced() {
        let (service, _) = service(vec![
            Reply::Lines(HELLO.to_vec()),
            Reply::Lines(HELLO.to_vec()),
        ]);
        let first = ask(&service, "one", true).await.0.unwrap();
        service.sessions().store().delete(&first.session_id).await.unwrap();

        let second = ask(&service, "two", true).await.0.unwrap();
        assert!(second.created);
        assert_ne!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_blank_question_is_not_sent() {
        let (service, transport) = service(vec![]);
        let (result, _) = ask(&service, "   ", true).await;
        assert!(matches!(result, Err(ParleyError::Invalid(_))));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    async fn ask_assistant(service: &ConversationService, owner_id: &str, question: &str) -> Result<AskOutcome> {
        let (tx, _rx) = watch::channel(StreamSnapshot::default());
        service
            .ask_assistant(owner_id, question, true, &tx, &CancellationToken::new())
            .await
    }

    fn tutor() -> AssistantConfig {
        AssistantConfig {
            name: "Tutor".to_string(),
            description: String::new(),
            session: SessionConfig {
                system_prompt: "Explain slowly".to_string(),
                ..SessionConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn test_assistant_answers_land_in_owner_sessions() {
        let (service, transport) = service(vec![
            Reply::Lines(HELLO.to_vec()),
            Reply::Lines(HELLO.to_vec()),
        ]);
        service.assistants().save_config("7", tutor()).await.unwrap();

        let first = ask_assistant(&service, "7", "one").await.unwrap();
        assert!(first.created);
        assert!(first.session_id.starts_with("CHAT_7_"));

        let second = ask_assistant(&service, "7", "two").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.session_id, first.session_id);

        let record = service.assistants().session("7", &first.session_id).await.unwrap();
        let users: Vec<&str> = record.messages.iter().map(|m| m.user.as_str()).collect();
        assert_eq!(users, vec!["one", "two"]);
        assert_eq!(record.config.name, "Tutor");
        assert_eq!(transport.requests.lock().unwrap()[0].system_prompt, "Explain slowly");

        // The chat area is untouched.
        assert!(service.sessions().store().get_all().await.unwrap().is_empty());
        assert_eq!(service.assistants().config("7").await.unwrap().name, "Tutor");
    }

    #[tokio::test]
    async fn test_assistant_switch_starts_a_session_for_the_new_owner() {
        let (service, _) = service(vec![
            Reply::Lines(HELLO.to_vec()),
            Reply::Lines(HELLO.to_vec()),
        ]);
        service.assistants().save_config("7", tutor()).await.unwrap();
        service.assistants().save_config("70", tutor()).await.unwrap();

        let seven = ask_assistant(&service, "7", "one").await.unwrap();
        let seventy = ask_assistant(&service, "70", "two").await.unwrap();

        assert!(seventy.created);
        assert!(seventy.session_id.starts_with("CHAT_70_"));
        let kept = service.assistants().session("7", &seven.session_id).await.unwrap();
        assert_eq!(kept.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_assistant_is_not_asked() {
        let (service, transport) = service(vec![]);
        let err = ask_assistant(&service, "9", "hi").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(transport.requests.lock().unwrap().is_empty());
    }
}
