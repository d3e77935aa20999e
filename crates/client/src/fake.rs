//! In-memory fake server for unit and behavior testing.
//!
//! Plays the role the real server plays on the other end of the transport:
//! it answers session establishment, keep-alive, service resolution, and
//! generic service calls, and lets tests script failures per method.
//!
//! # Example
//!
//! ```ignore
//! let server = FakeServer::new();
//! server.fail_next("find", ErrorCategory::Unknown, "overloaded", 1);
//! let mut gateway = Gateway::new(identity, Arc::new(server.clone()), policy);
//! assert!(gateway.connect(None).await);
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mira_protocol::{
	CloseSessionAck, CreateSessionParams, ErrorCategory, EventContext, JoinSessionParams, Request,
	SessionInfo, UserData, session_methods,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportFactory, TransportParts, TransportReceiver};

#[derive(Debug, Clone)]
enum Scripted {
	Fail { category: ErrorCategory, message: String },
	Respond(Value),
	/// Accept the request but never answer it.
	Swallow,
}

#[derive(Debug, Clone)]
struct UserRecord {
	id: i64,
	password: Option<String>,
	/// (group id, group name); first entry is the default group.
	groups: Vec<(i64, String)>,
}

#[derive(Debug, Clone)]
struct SessionRecord {
	user: String,
	group_id: i64,
	group_name: String,
	refcount: u32,
}

/// Shared ownership of a link's outbound channel so severing the link drops
/// the sender and lets the connection's message loop observe closure.
type SharedTx = Arc<Mutex<Option<mpsc::UnboundedSender<Value>>>>;

struct Link {
	message_tx: SharedTx,
	_keepopen_tx: mpsc::UnboundedSender<()>,
}

#[derive(Default)]
struct ServerState {
	sent: Mutex<Vec<Value>>,
	scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
	users: Mutex<HashMap<String, UserRecord>>,
	sessions: Mutex<HashMap<String, SessionRecord>>,
	links: Mutex<Vec<Link>>,
	session_counter: AtomicU64,
	ref_counter: AtomicU64,
	handshakes: AtomicU32,
	connections: AtomicU32,
	failing_connects: AtomicU32,
	method_calls: Mutex<HashMap<String, u32>>,
}

/// Scriptable in-memory peer implementing [`TransportFactory`].
#[derive(Clone, Default)]
pub struct FakeServer {
	state: Arc<ServerState>,
}

impl FakeServer {
	/// Creates a server pre-seeded with users `ada` (groups `lab`, `screening`)
	/// and `grace` (group `lab`).
	pub fn new() -> Self {
		let server = Self { state: Arc::new(ServerState::default()) };
		server.add_user("ada", Some("pw"), &[(3, "lab"), (5, "screening")]);
		server.add_user("grace", Some("gw"), &[(3, "lab")]);
		server
	}

	pub fn add_user(&self, login: &str, password: Option<&str>, groups: &[(i64, &str)]) {
		let mut users = self.state.users.lock().unwrap();
		let id = users.len() as i64 + 100;
		users.insert(
			login.to_string(),
			UserRecord {
				id,
				password: password.map(str::to_string),
				groups: groups.iter().map(|(id, name)| (*id, name.to_string())).collect(),
			},
		);
	}

	/// Scripts the next `times` calls of `method` to fail with `category`.
	pub fn fail_next(&self, method: &str, category: ErrorCategory, message: &str, times: u32) {
		let mut scripts = self.state.scripts.lock().unwrap();
		let queue = scripts.entry(method.to_string()).or_default();
		for _ in 0..times {
			queue.push_back(Scripted::Fail {
				category,
				message: message.to_string(),
			});
		}
	}

	/// Scripts the next call of `method` to answer with `value`.
	pub fn respond_next(&self, method: &str, value: Value) {
		self.state
			.scripts
			.lock()
			.unwrap()
			.entry(method.to_string())
			.or_default()
			.push_back(Scripted::Respond(value));
	}

	/// Scripts the next `times` calls of `method` to be accepted but never
	/// answered (pair with [`FakeServer::drop_link`]).
	pub fn swallow_next(&self, method: &str, times: u32) {
		let mut scripts = self.state.scripts.lock().unwrap();
		let queue = scripts.entry(method.to_string()).or_default();
		for _ in 0..times {
			queue.push_back(Scripted::Swallow);
		}
	}

	/// Makes the next `times` transport connects fail outright.
	pub fn fail_connect(&self, times: u32) {
		self.state.failing_connects.store(times, Ordering::SeqCst);
	}

	/// Severs every open link; pending calls observe a closed channel.
	pub fn drop_link(&self) {
		let mut links = self.state.links.lock().unwrap();
		for link in links.drain(..) {
			link.message_tx.lock().unwrap().take();
		}
	}

	/// Forgets a session server-side, as an expiry reaper would.
	pub fn expire_session(&self, uuid: &str) {
		self.state.sessions.lock().unwrap().remove(uuid);
	}

	/// Number of `createSession` attempts seen, scripted answers included.
	pub fn handshakes(&self) -> u32 {
		self.state.handshakes.load(Ordering::SeqCst)
	}

	/// Number of physical connections opened.
	pub fn connections(&self) -> u32 {
		self.state.connections.load(Ordering::SeqCst)
	}

	/// Number of calls seen for `method`.
	pub fn calls(&self, method: &str) -> u32 {
		*self.state.method_calls.lock().unwrap().get(method).unwrap_or(&0)
	}

	/// Refcount the server currently holds for `uuid`, if the session lives.
	pub fn session_refcount(&self, uuid: &str) -> Option<u32> {
		self.state.sessions.lock().unwrap().get(uuid).map(|s| s.refcount)
	}

	/// Takes all request envelopes seen so far, clearing the buffer.
	pub fn take_sent(&self) -> Vec<Value> {
		std::mem::take(&mut *self.state.sent.lock().unwrap())
	}

	/// Opens one in-memory link to this server.
	pub async fn open(&self) -> Result<TransportParts> {
		let failing = &self.state.failing_connects;
		if failing
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
		{
			return Err(Error::Transport("connection refused".to_string()));
		}
		self.state.connections.fetch_add(1, Ordering::SeqCst);

		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (keepopen_tx, keepopen_rx) = mpsc::unbounded_channel::<()>();
		let message_tx: SharedTx = Arc::new(Mutex::new(Some(message_tx)));

		self.state.links.lock().unwrap().push(Link {
			message_tx: Arc::clone(&message_tx),
			_keepopen_tx: keepopen_tx,
		});

		Ok(TransportParts {
			sender: Box::new(FakeSender {
				state: Arc::clone(&self.state),
				message_tx,
			}),
			receiver: Box::new(FakeReceiver { keepopen_rx }),
			message_rx,
		})
	}

	fn event_context(state: &ServerState, uuid: &str, record: &SessionRecord) -> Value {
		let users = state.users.lock().unwrap();
		let user = &users[&record.user];
		serde_json::to_value(EventContext {
			user_id: user.id,
			user_name: record.user.clone(),
			group_id: record.group_id,
			group_name: record.group_name.clone(),
			is_admin: false,
			member_of_groups: user.groups.iter().map(|(id, _)| *id).collect(),
			leader_of_groups: Vec::new(),
			session_uuid: uuid.to_string(),
		})
		.unwrap()
	}

	fn handle(state: &ServerState, request: &Request) -> std::result::Result<Value, (ErrorCategory, String)> {
		let security = |msg: &str| (ErrorCategory::SecurityViolation, msg.to_string());
		let expired = |msg: &str| (ErrorCategory::SessionExpired, msg.to_string());

		// Any call outside the session service requires a live session.
		if request.service != "session" {
			let sessions = state.sessions.lock().unwrap();
			let live = request
				.session
				.as_ref()
				.is_some_and(|uuid| sessions.contains_key(uuid));
			if !live {
				return Err(expired("no such session"));
			}
		}

		match request.method.as_str() {
			session_methods::CREATE => {
				let params: CreateSessionParams =
					serde_json::from_value(request.params.clone()).map_err(|e| security(&e.to_string()))?;
				let effective_login = params.impersonate.as_deref().unwrap_or(&params.username);

				let users = state.users.lock().unwrap();
				let Some(authenticating) = users.get(&params.username) else {
					return Err(security("unknown principal"));
				};
				if authenticating.password.as_deref() != params.password.as_deref() {
					return Err(security("credentials rejected"));
				}
				let Some(effective) = users.get(effective_login) else {
					return Err(security("unknown impersonation target"));
				};

				let (group_id, group_name) = match &params.group {
					Some(requested) => effective
						.groups
						.iter()
						.find(|(_, name)| name == requested)
						.cloned()
						.ok_or_else(|| security("not authorized for requested group"))?,
					None => effective.groups[0].clone(),
				};
				drop(users);

				let n = state.session_counter.fetch_add(1, Ordering::SeqCst);
				let uuid = format!("sess-{n}");
				state.sessions.lock().unwrap().insert(
					uuid.clone(),
					SessionRecord {
						user: effective_login.to_string(),
						group_id,
						group_name,
						refcount: 1,
					},
				);
				Ok(serde_json::to_value(SessionInfo { uuid }).unwrap())
			}
			session_methods::JOIN => {
				let params: JoinSessionParams =
					serde_json::from_value(request.params.clone()).map_err(|e| security(&e.to_string()))?;
				let mut sessions = state.sessions.lock().unwrap();
				match sessions.get_mut(&params.uuid) {
					Some(record) => {
						record.refcount += 1;
						Ok(serde_json::to_value(SessionInfo { uuid: params.uuid }).unwrap())
					}
					None => Err(expired("no such session")),
				}
			}
			session_methods::CLOSE => {
				let uuid = request.params["uuid"].as_str().unwrap_or_default().to_string();
				let soft = request.params["soft"].as_bool().unwrap_or(false);
				let mut sessions = state.sessions.lock().unwrap();
				let Some(record) = sessions.get_mut(&uuid) else {
					return Err(expired("no such session"));
				};
				let remaining = if soft { record.refcount.saturating_sub(1) } else { 0 };
				if remaining == 0 {
					sessions.remove(&uuid);
				} else {
					record.refcount = remaining;
				}
				Ok(serde_json::to_value(CloseSessionAck { remaining }).unwrap())
			}
			session_methods::KEEP_ALIVE => {
				let sessions = state.sessions.lock().unwrap();
				let live = request
					.session
					.as_ref()
					.is_some_and(|uuid| sessions.contains_key(uuid));
				if live { Ok(json!(true)) } else { Err(expired("no such session")) }
			}
			session_methods::EVENT_CONTEXT => {
				let sessions = state.sessions.lock().unwrap();
				let uuid = request.session.as_deref().unwrap_or_default();
				match sessions.get(uuid) {
					Some(record) => Ok(Self::event_context(state, uuid, record)),
					None => Err(expired("no such session")),
				}
			}
			session_methods::RESOLVE_SERVICE => {
				let name = request.params["name"].as_str().unwrap_or_default();
				let n = state.ref_counter.fetch_add(1, Ordering::SeqCst);
				Ok(json!({ "reference": format!("{name}@{n}") }))
			}
			session_methods::CAST_SERVICE => {
				let reference = request.params["reference"].as_str().unwrap_or_default();
				let name = reference.split('@').next().unwrap_or_default();
				let n = state.ref_counter.fetch_add(1, Ordering::SeqCst);
				Ok(json!({ "reference": format!("{name}@{n}") }))
			}
			session_methods::CLOSE_SERVICE => Ok(Value::Null),
			"getUser" => {
				let login = request.params["login"].as_str().unwrap_or_default();
				let users = state.users.lock().unwrap();
				match users.get(login) {
					Some(user) => Ok(serde_json::to_value(UserData {
						id: user.id,
						login: login.to_string(),
						first_name: None,
						last_name: None,
						email: None,
					})
					.unwrap()),
					None => Err(security("unknown user")),
				}
			}
			_ => Ok(json!({ "ok": true })),
		}
	}
}

impl TransportFactory for FakeServer {
	fn connect(&self) -> Pin<Box<dyn Future<Output = Result<TransportParts>> + Send + '_>> {
		Box::pin(self.open())
	}
}

struct FakeSender {
	state: Arc<ServerState>,
	message_tx: SharedTx,
}

impl Transport for FakeSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.message_tx.lock().unwrap().is_none() {
				return Err(Error::Transport("link dropped".to_string()));
			}

			let request: Request = serde_json::from_value(message.clone())
				.map_err(|e| Error::Transport(format!("malformed request: {e}")))?;

			self.state.sent.lock().unwrap().push(message);
			*self
				.state
				.method_calls
				.lock()
				.unwrap()
				.entry(request.method.clone())
				.or_default() += 1;
			// Counted here, not in the handler, so scripted answers count too.
			if request.method == session_methods::CREATE {
				self.state.handshakes.fetch_add(1, Ordering::SeqCst);
			}

			let scripted = self
				.state
				.scripts
				.lock()
				.unwrap()
				.get_mut(&request.method)
				.and_then(VecDeque::pop_front);

			let reply = match scripted {
				Some(Scripted::Swallow) => return Ok(()),
				Some(Scripted::Fail { category, message }) => json!({
					"id": request.id,
					"error": { "category": category, "message": message }
				}),
				Some(Scripted::Respond(value)) => json!({ "id": request.id, "result": value }),
				None => match FakeServer::handle(&self.state, &request) {
					Ok(result) => json!({ "id": request.id, "result": result }),
					Err((category, message)) => json!({
						"id": request.id,
						"error": { "category": category, "message": message }
					}),
				},
			};

			if let Some(tx) = self.message_tx.lock().unwrap().as_ref() {
				let _ = tx.send(reply);
			}
			Ok(())
		})
	}
}

struct FakeReceiver {
	keepopen_rx: mpsc::UnboundedReceiver<()>,
}

impl TransportReceiver for FakeReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			// Parks until the server drops the link.
			while self.keepopen_rx.recv().await.is_some() {}
			Ok(())
		})
	}
}
