use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{error, warn};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinSet};

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// The error returned when sending to an actor whose mailbox is closed.
#[derive(Debug, Clone, Copy, Error)]
#[error("{0} actor has stopped")]
pub struct ActorStopped(pub &'static str);

#[async_trait::async_trait]
pub trait Actor: Sized + Send + 'static {
    type Message: Send + 'static;
    type Options: Send + 'static;

    fn name() -> &'static str;
    fn new(options: Self::Options) -> Self;
    async fn start(&mut self, _ctx: &mut ActorContext<Self>) {}
    /// Process one message and return the next action.
    /// All messages are processed sequentially in a single task, so this
    /// method must not block. Async work is spawned via [ActorContext::spawn]
    /// and reports back to the actor by sending itself a message.
    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction;
    async fn stop(self, _ctx: &mut ActorContext<Self>) {}
}

pub enum ActorAction {
    Continue,
    Stop,
}

pub struct ActorContext<T: Actor> {
    handle: ActorHandle<T>,
    /// Tasks spawned by the actor while processing messages.
    /// All of them are aborted when the actor stops.
    tasks: JoinSet<()>,
}

impl<T: Actor> ActorContext<T> {
    fn new(handle: &ActorHandle<T>) -> Self {
        Self {
            handle: handle.clone(),
            tasks: JoinSet::new(),
        }
    }

    pub fn handle(&self) -> &ActorHandle<T> {
        &self.handle
    }

    /// Send a message to the actor itself.
    /// The message is placed at the end of the mailbox.
    pub fn send(&mut self, message: T::Message) {
        if self.handle.send(message).is_err() {
            warn!("failed to send message to the {} actor itself", T::name());
        }
    }

    /// Send a message to the actor itself after a delay.
    /// The returned handle can be used to cancel the delayed delivery.
    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) -> AbortHandle {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = handle.send(message);
        })
    }

    /// Spawn a task and save its handle in the context.
    /// When the task needs to report errors or results, it should send
    /// a message to the actor via a cloned [ActorHandle].
    pub fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) -> AbortHandle {
        self.tasks.spawn(task)
    }

    /// Subscribe to the termination of a peer actor.
    /// The given message is delivered to this actor once the peer stops.
    pub fn watch<P: Actor>(&mut self, peer: &ActorHandle<P>, message: T::Message) -> AbortHandle {
        let peer = peer.clone();
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            peer.wait_for_stop().await;
            let _ = handle.send(message);
        })
    }

    /// Join tasks that have completed and log panics.
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("failed to join task spawned by the {} actor: {e}", T::name());
                }
            }
        }
    }
}

pub struct ActorHandle<T: Actor> {
    id: u64,
    sender: mpsc::UnboundedSender<T::Message>,
    stopped: watch::Receiver<bool>,
}

impl<T: Actor> Clone for ActorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sender: self.sender.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T: Actor> std::fmt::Debug for ActorHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActorHandle({}#{})", T::name(), self.id)
    }
}

impl<T: Actor> ActorHandle<T> {
    pub fn new(options: T::Options) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stopped_tx, stopped_rx) = watch::channel::<bool>(false);
        let handle = Self {
            id: NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed),
            sender: tx,
            stopped: stopped_rx,
        };
        let runner = ActorRunner {
            actor: T::new(options),
            ctx: ActorContext::new(&handle),
            receiver: rx,
            stopped: stopped_tx,
        };
        // The actor runs "detached" and the event loop task stops by itself
        // when the stop action is taken.
        tokio::spawn(runner.run());
        handle
    }

    /// A process-unique identity for the underlying actor.
    /// Clones of the same handle share the identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(&self, message: T::Message) -> Result<(), ActorStopped> {
        self.sender.send(message).map_err(|_| ActorStopped(T::name()))
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    pub async fn wait_for_stop(mut self) {
        // We ignore the receiver error since the sender must have been dropped
        // in this case, which means the actor has stopped.
        let _ = self.stopped.wait_for(|x| *x).await;
    }
}

struct ActorRunner<T: Actor> {
    actor: T,
    ctx: ActorContext<T>,
    receiver: mpsc::UnboundedReceiver<T::Message>,
    stopped: watch::Sender<bool>,
}

impl<T: Actor> ActorRunner<T> {
    async fn run(mut self) {
        self.actor.start(&mut self.ctx).await;
        while let Some(message) = self.receiver.recv().await {
            match self.actor.receive(&mut self.ctx, message) {
                ActorAction::Continue => {}
                ActorAction::Stop => break,
            }
            self.ctx.reap();
        }
        self.actor.stop(&mut self.ctx).await;
        let _ = self.stopped.send(true);
    }
}

/// A set of actors whose lifetimes are tracked together.
/// Joining the system waits for every spawned actor to stop.
#[derive(Default)]
pub struct ActorSystem {
    stopped: Vec<watch::Receiver<bool>>,
}

impl ActorSystem {
    pub fn new() -> Self {
        Self { stopped: vec![] }
    }

    pub fn spawn<T: Actor>(&mut self, options: T::Options) -> ActorHandle<T> {
        let handle = ActorHandle::<T>::new(options);
        self.stopped.push(handle.stopped.clone());
        handle
    }

    pub async fn join(self) {
        for mut stopped in self.stopped {
            let _ = stopped.wait_for(|x| *x).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    struct TestActor;

    enum TestMessage {
        Echo {
            value: String,
            reply: oneshot::Sender<String>,
        },
        Tick {
            reply: oneshot::Sender<()>,
        },
        Stop,
    }

    #[async_trait::async_trait]
    impl Actor for TestActor {
        type Message = TestMessage;
        type Options = ();

        fn name() -> &'static str {
            "TestActor"
        }

        fn new(_options: Self::Options) -> Self {
            Self
        }

        fn receive(
            &mut self,
            _ctx: &mut ActorContext<Self>,
            message: Self::Message,
        ) -> ActorAction {
            match message {
                TestMessage::Echo { value, reply } => {
                    let _ = reply.send(value.to_uppercase());
                    ActorAction::Continue
                }
                TestMessage::Tick { reply } => {
                    let _ = reply.send(());
                    ActorAction::Continue
                }
                TestMessage::Stop => ActorAction::Stop,
            }
        }
    }

    #[tokio::test]
    async fn test_actor_handle_send() {
        let handle = ActorHandle::<TestActor>::new(());
        let (tx, rx) = oneshot::channel();
        let result = handle.send(TestMessage::Echo {
            value: "hello".to_string(),
            reply: tx,
        });
        assert!(matches!(result, Ok(())));
        assert_eq!(rx.await, Ok("HELLO".to_string()));
    }

    #[tokio::test]
    async fn test_actor_handle_wait_for_stop() {
        let handle = ActorHandle::<TestActor>::new(());
        assert!(!handle.is_stopped());
        let result = handle.send(TestMessage::Stop);
        assert!(matches!(result, Ok(())));

        handle.clone().wait_for_stop().await;
        // Multiple handles should be able to wait for the actor to stop.
        handle.clone().wait_for_stop().await;
        assert!(handle.is_stopped());
        assert!(handle
            .send(TestMessage::Stop)
            .is_err_and(|e| e.to_string().contains("TestActor")));
    }

    struct DelayActor {
        reply: Option<oneshot::Sender<()>>,
    }

    enum DelayMessage {
        Arm { reply: oneshot::Sender<()> },
        Fire,
    }

    #[async_trait::async_trait]
    impl Actor for DelayActor {
        type Message = DelayMessage;
        type Options = ();

        fn name() -> &'static str {
            "DelayActor"
        }

        fn new(_options: Self::Options) -> Self {
            Self { reply: None }
        }

        fn receive(
            &mut self,
            ctx: &mut ActorContext<Self>,
            message: Self::Message,
        ) -> ActorAction {
            match message {
                DelayMessage::Arm { reply } => {
                    self.reply = Some(reply);
                    ctx.send_with_delay(DelayMessage::Fire, Duration::from_secs(5));
                    ActorAction::Continue
                }
                DelayMessage::Fire => {
                    if let Some(reply) = self.reply.take() {
                        let _ = reply.send(());
                    }
                    ActorAction::Stop
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_actor_delayed_self_message() {
        let handle = ActorHandle::<DelayActor>::new(());
        let (tx, rx) = oneshot::channel();
        let _ = handle.send(DelayMessage::Arm { reply: tx });
        // The paused clock auto-advances once all tasks are idle, so the
        // delayed message fires without an explicit sleep here.
        assert_eq!(rx.await, Ok(()));
        handle.wait_for_stop().await;
    }

    struct WatcherActor {
        reply: Option<oneshot::Sender<()>>,
    }

    enum WatcherMessage {
        Watch {
            peer: ActorHandle<TestActor>,
            reply: oneshot::Sender<()>,
        },
        PeerExited,
    }

    #[async_trait::async_trait]
    impl Actor for WatcherActor {
        type Message = WatcherMessage;
        type Options = ();

        fn name() -> &'static str {
            "WatcherActor"
        }

        fn new(_options: Self::Options) -> Self {
            Self { reply: None }
        }

        fn receive(
            &mut self,
            ctx: &mut ActorContext<Self>,
            message: Self::Message,
        ) -> ActorAction {
            match message {
                WatcherMessage::Watch { peer, reply } => {
                    self.reply = Some(reply);
                    ctx.watch(&peer, WatcherMessage::PeerExited);
                    ActorAction::Continue
                }
                WatcherMessage::PeerExited => {
                    if let Some(reply) = self.reply.take() {
                        let _ = reply.send(());
                    }
                    ActorAction::Stop
                }
            }
        }
    }

    #[tokio::test]
    async fn test_actor_watch_peer_termination() {
        let peer = ActorHandle::<TestActor>::new(());
        let watcher = ActorHandle::<WatcherActor>::new(());
        let (tx, rx) = oneshot::channel();
        let _ = watcher.send(WatcherMessage::Watch {
            peer: peer.clone(),
            reply: tx,
        });
        let _ = peer.send(TestMessage::Stop);
        assert_eq!(rx.await, Ok(()));
        watcher.wait_for_stop().await;
    }

    #[tokio::test]
    async fn test_actor_system_join() {
        let mut system = ActorSystem::new();
        let first = system.spawn::<TestActor>(());
        let second = system.spawn::<TestActor>(());
        let _ = first.send(TestMessage::Stop);
        let _ = second.send(TestMessage::Stop);
        system.join().await;
        assert!(first.is_stopped());
        assert!(second.is_stopped());
    }

    #[tokio::test]
    async fn test_actor_mailbox_order() {
        let handle = ActorHandle::<TestActor>::new(());
        let mut receivers = vec![];
        for value in ["a", "b", "c"] {
            let (tx, rx) = oneshot::channel();
            let _ = handle.send(TestMessage::Echo {
                value: value.to_string(),
                reply: tx,
            });
            receivers.push(rx);
        }
        let (tx, rx) = oneshot::channel();
        let _ = handle.send(TestMessage::Tick { reply: tx });
        rx.await.unwrap();
        let mut out = vec![];
        for rx in receivers {
            out.push(rx.await.unwrap());
        }
        assert_eq!(out, vec!["A", "B", "C"]);
    }
}
