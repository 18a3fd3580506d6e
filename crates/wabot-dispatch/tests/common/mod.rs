#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use wabot_dispatch::{
    default_registry, Command, CommandContext, CommandDescriptor, CommandError, Dispatcher,
    InboundMessage, Outcome, ReplySink, TransportError,
};
use wabot_guard::{ArgKind, SecurityManager};
use wabot_types::WabotConfig;

pub const OWNER: &str = "628111000111";

/// Records every reply instead of sending it.
#[derive(Default)]
pub struct RecordingSink {
    replies: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn replies_to(&self, chat_id: &str) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| chat == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_to(&self, chat_id: &str) -> Option<String> {
        self.replies_to(chat_id).pop()
    }

    pub fn count(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.replies.lock().unwrap().clear();
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn reply(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        self.replies
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Default config with one owner and no default cooldown, so tests can send
/// several commands per user.
pub fn config() -> WabotConfig {
    let mut config = WabotConfig::with_owners(&[OWNER]);
    config.limits.default_cooldown_ms = 0;
    config
}

pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(config(), Vec::new())
    }

    pub fn with(config: WabotConfig, extra: Vec<Arc<dyn Command>>) -> Self {
        let security = Arc::new(SecurityManager::from_config(&config));
        let mut registry = default_registry().unwrap();
        for command in extra {
            registry.register(command).unwrap();
        }
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            security,
            registry,
            Arc::clone(&sink) as Arc<dyn ReplySink>,
        ));
        Self { dispatcher, sink }
    }

    pub fn security(&self) -> &SecurityManager {
        self.dispatcher.security()
    }

    pub fn allow(&self, id: &str) {
        self.security().allow(id, OWNER).unwrap();
    }

    pub async fn dm(&self, sender: &str, text: &str) -> Outcome {
        self.dispatcher
            .handle_inbound(InboundMessage::direct(sender, text))
            .await
    }

    pub async fn group(&self, sender: &str, is_admin: bool, text: &str) -> Outcome {
        self.dispatcher
            .handle_inbound(InboundMessage::group(GROUP, sender, is_admin, text))
            .await
    }
}

pub const GROUP: &str = "120363000000@g.us";

/// A command whose behaviour is chosen by the test.
pub struct Scripted {
    desc: CommandDescriptor,
    behaviour: Behaviour,
    pub runs: AtomicUsize,
}

pub enum Behaviour {
    Succeed,
    Fail(&'static str),
    Panic,
    /// Wait for a permit on the semaphore before returning.
    Wait(Arc<Semaphore>),
}

impl Scripted {
    pub fn new(desc: CommandDescriptor, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            desc,
            behaviour,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Command for Scripted {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.desc
    }

    async fn execute(&self, ctx: &CommandContext) -> Result<(), CommandError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Succeed => {
                ctx.reply(&format!("{} ok", self.desc.name)).await?;
                Ok(())
            }
            Behaviour::Fail(msg) => Err(CommandError::Failed(msg.to_string())),
            Behaviour::Panic => panic!("scripted panic"),
            Behaviour::Wait(gate) => {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| CommandError::Failed(e.to_string()))?;
                permit.forget();
                Ok(())
            }
        }
    }
}

/// A URL-taking command, the shape of a downloader.
pub fn downloader() -> Arc<Scripted> {
    Scripted::new(
        CommandDescriptor::new("dl", "download")
            .args(ArgKind::Url)
            .cooldown(Duration::ZERO),
        Behaviour::Succeed,
    )
}

/// Poll `cond` until it holds, failing the test after about a second.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
