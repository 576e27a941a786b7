//! Fakes and an in-process SSH server shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, Sig, keys};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::auth::{AuthMethod, PasswordPrompt, TEST_PRIVATE_KEY};
use super::client::{AlgorithmProfile, Connector, ExecOutput, RemoteConnection};
use super::error::{AttemptError, ChannelError};
use super::types::HostRecord;

/// Password prompt that answers from a fixed script and records every prompt.
#[derive(Clone, Default)]
pub struct ScriptedPrompt {
    inner: Arc<Mutex<PromptState>>,
}

#[derive(Default)]
struct PromptState {
    answers: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromptState {
                answers: answers.into_iter().map(Into::into).collect(),
                prompts: Vec::new(),
            })),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.lock().unwrap().prompts.len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.inner.lock().unwrap().prompts.clone()
    }
}

impl PasswordPrompt for ScriptedPrompt {
    fn read_password(&self, prompt: &str) -> io::Result<String> {
        let mut state = self.inner.lock().unwrap();
        state.prompts.push(prompt.to_string());
        state
            .answers
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no terminal input"))
    }
}

/// Writer whose bytes can be inspected after the fact.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Behaviour of one fake host.
#[derive(Clone, Default)]
pub struct HostScript {
    modern_fails: bool,
    legacy_fails: bool,
    failing_commands: HashSet<String>,
    session_errors: HashSet<String>,
    outputs: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
}

impl HostScript {
    /// Only the legacy profile connects.
    pub fn legacy_only(mut self) -> Self {
        self.modern_fails = true;
        self
    }

    /// Neither profile connects.
    pub fn unreachable(mut self) -> Self {
        self.modern_fails = true;
        self.legacy_fails = true;
        self
    }

    /// `command` exits with status 1.
    pub fn failing(mut self, command: &str) -> Self {
        self.failing_commands.insert(command.to_string());
        self
    }

    /// Opening a channel for `command` fails.
    pub fn session_error(mut self, command: &str) -> Self {
        self.session_errors.insert(command.to_string());
        self
    }

    pub fn output(mut self, command: &str, output: &str) -> Self {
        self.outputs
            .insert(command.to_string(), output.as_bytes().to_vec());
        self
    }

    /// Every command takes this long.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct FakeState {
    attempts: HashMap<String, Vec<AlgorithmProfile>>,
    executed: HashMap<String, Vec<(String, Option<Vec<u8>>)>>,
    closed: HashMap<String, usize>,
    open: usize,
    max_open: usize,
}

/// Connector that never touches the network.
#[derive(Clone, Default)]
pub struct FakeConnector {
    scripts: HashMap<String, HostScript>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, script: HostScript) -> Self {
        self.scripts.insert(host.to_string(), script);
        self
    }

    pub fn attempts(&self, host: &str) -> Vec<AlgorithmProfile> {
        let state = self.state.lock().unwrap();
        state.attempts.get(host).cloned().unwrap_or_default()
    }

    pub fn executed(&self, host: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .executed
            .get(host)
            .map(|runs| runs.iter().map(|(cmd, _)| cmd.clone()).collect())
            .unwrap_or_default()
    }

    pub fn stdin_for(&self, host: &str, command: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .executed
            .get(host)
            .and_then(|runs| runs.iter().find(|(cmd, _)| cmd == command))
            .and_then(|(_, stdin)| stdin.clone())
    }

    pub fn closed(&self, host: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.closed.get(host).copied().unwrap_or(0)
    }

    /// Highest number of connections that were open at the same time.
    pub fn max_open(&self) -> usize {
        self.state.lock().unwrap().max_open
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        host: &HostRecord,
        _auth: &AuthMethod,
        profile: AlgorithmProfile,
    ) -> Result<FakeConnection, AttemptError> {
        let script = self.scripts.get(host.label()).cloned().unwrap_or_default();

        let mut state = self.state.lock().unwrap();
        state
            .attempts
            .entry(host.label().to_string())
            .or_default()
            .push(profile);

        let refused = match profile {
            AlgorithmProfile::Modern => script.modern_fails,
            AlgorithmProfile::Legacy => script.legacy_fails,
        };
        if refused {
            return Err(AttemptError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} attempt refused", profile),
            )));
        }

        state.open += 1;
        state.max_open = state.max_open.max(state.open);

        Ok(FakeConnection {
            host: host.label().to_string(),
            script,
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeConnection {
    host: String,
    script: HostScript,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn execute(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, ChannelError> {
        if self.script.session_errors.contains(command) {
            return Err(ChannelError::Open("channel limit reached".to_string()));
        }

        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }

        self.state
            .lock()
            .unwrap()
            .executed
            .entry(self.host.clone())
            .or_default()
            .push((command.to_string(), stdin));

        if self.script.failing_commands.contains(command) {
            return Ok(ExecOutput {
                output: b"boom\n".to_vec(),
                exit_status: Some(1),
                ..Default::default()
            });
        }

        let output = self
            .script
            .outputs
            .get(command)
            .cloned()
            .unwrap_or_else(|| format!("ran {}\n", command).into_bytes());

        Ok(ExecOutput {
            output,
            exit_status: Some(0),
            ..Default::default()
        })
    }

    async fn close(&self) {
        let mut state = self.state.lock().unwrap();
        *state.closed.entry(self.host.clone()).or_default() += 1;
        state.open = state.open.saturating_sub(1);
    }
}

/// In-process SSH server answering a few scripted commands.
///
/// | Command | Behaviour |
/// |---------|-----------|
/// | `cat`, `sudo -S cat` | echoes stdin, exits 0 on EOF |
/// | `both` | `out` on stdout, `err` on stderr, exits 0 |
/// | `fail` | prints `partial`, exits 3 |
/// | `killed` | ends with a `KILL` exit signal |
/// | `hang` | prints `started` and never exits |
/// | `ignore-stdin` | prints `done`, exits 0 without reading stdin |
///
/// Any password is accepted.
pub struct TestServer {
    pub port: u16,
    ended: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let key = keys::decode_secret_key(TEST_PRIVATE_KEY, None).unwrap();
        let config = Arc::new(server::Config {
            keys: vec![key],
            inactivity_timeout: None,
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ended = Arc::new(AtomicUsize::new(0));

        let sessions_ended = Arc::clone(&ended);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                let handler = ScriptedShell {
                    ended: Arc::clone(&sessions_ended),
                    echo: HashSet::new(),
                };
                tokio::spawn(async move {
                    if let Ok(session) = server::run_stream(config, socket, handler).await {
                        let _ = session.await;
                    }
                });
            }
        });

        Self { port, ended, task }
    }

    /// Number of client sessions that have ended.
    pub fn sessions_ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ScriptedShell {
    ended: Arc<AtomicUsize>,
    /// Channels running an echoing command
    echo: HashSet<ChannelId>,
}

impl Drop for ScriptedShell {
    fn drop(&mut self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

fn finish(channel: ChannelId, status: u32, session: &mut Session) -> Result<(), russh::Error> {
    session.exit_status_request(channel, status)?;
    session.eof(channel)?;
    session.close(channel)
}

impl server::Handler for ScriptedShell {
    type Error = russh::Error;

    async fn auth_password(&mut self, _user: &str, _password: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel)?;
        match &*String::from_utf8_lossy(data) {
            "cat" | "sudo -S cat" => {
                self.echo.insert(channel);
            }
            "both" => {
                session.data(channel, CryptoVec::from_slice(b"out\n"))?;
                session.extended_data(channel, 1, CryptoVec::from_slice(b"err\n"))?;
                finish(channel, 0, session)?;
            }
            "fail" => {
                session.data(channel, CryptoVec::from_slice(b"partial\n"))?;
                finish(channel, 3, session)?;
            }
            "killed" => {
                session.exit_signal_request(channel, Sig::KILL, false, "killed", "en")?;
                session.eof(channel)?;
                session.close(channel)?;
            }
            "hang" => {
                session.data(channel, CryptoVec::from_slice(b"started\n"))?;
            }
            "ignore-stdin" => {
                session.data(channel, CryptoVec::from_slice(b"done\n"))?;
                finish(channel, 0, session)?;
            }
            _ => finish(channel, 127, session)?,
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.echo.contains(&channel) {
            session.data(channel, CryptoVec::from_slice(data))?;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.echo.remove(&channel) {
            finish(channel, 0, session)?;
        }
        Ok(())
    }
}
