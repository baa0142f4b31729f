//! A generic driver for protocol states paced by block heights.
//!
//! Each state waits `delay_blocks` after its start block, initiates, keeps
//! receiving messages for `active_blocks` and then transitions. The next
//! state starts at the block the previous one ended at, so members that
//! started together end every state at the same height.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{chain::BlockCounter, group::MemberIndex, Error};

/// The outcome of [`State::next`].
#[derive(Debug)]
pub enum Transition<S, O> {
    /// Continue with the given state.
    Next(S),
    /// The state machine finished with the given output.
    Done(O),
}

/// A state of a block-paced protocol.
#[async_trait]
pub trait State: Sized + Send {
    /// The messages this state machine receives.
    type Message: Send;
    /// What the final state produces.
    type Output: Send;

    /// A short name for logs and errors.
    fn name(&self) -> &'static str;

    /// Blocks to wait after the start of the state before initiating.
    fn delay_blocks(&self) -> u64;

    /// Blocks to keep receiving messages after initiating.
    fn active_blocks(&self) -> u64;

    /// The index of the member executing the state.
    fn member_index(&self) -> MemberIndex;

    /// Perform the state's computation and send its messages.
    async fn initiate(&mut self) -> Result<(), Error>;

    /// Handle a message received while the state is active. An error drops
    /// the message.
    fn receive(&mut self, message: Self::Message) -> Result<(), Error>;

    /// Build the next state once the active window closed.
    fn next(self) -> Result<Transition<Self, Self::Output>, Error>;
}

/// Run a state machine from `initial_state` starting at `start_block`.
///
/// Returns the output of the final state and the block at which it ended.
/// The run is cancelled with [`Error::ChannelClosed`] if `inbound` closes.
pub async fn execute<S, B>(
    initial_state: S,
    block_counter: &B,
    start_block: u64,
    inbound: &mut mpsc::Receiver<S::Message>,
) -> Result<(S::Output, u64), Error>
where
    S: State,
    B: BlockCounter + ?Sized,
{
    let mut state = initial_state;
    let mut start_block = start_block;

    loop {
        let member = state.member_index();
        let name = state.name();

        let initiate_block = start_block + state.delay_blocks();
        receive_until(&mut state, block_counter, initiate_block, inbound).await?;

        debug!(%member, state = name, block = initiate_block, "initiating state");
        state
            .initiate()
            .await
            .map_err(|err| Error::InitiateFailed {
                state: name,
                reason: err.to_string(),
            })?;

        let end_block = initiate_block + state.active_blocks();
        receive_until(&mut state, block_counter, end_block, inbound).await?;

        match state.next()? {
            Transition::Next(next_state) => {
                info!(
                    %member,
                    from = name,
                    to = next_state.name(),
                    block = end_block,
                    "state transition"
                );
                state = next_state;
                start_block = end_block;
            }
            Transition::Done(output) => {
                info!(%member, state = name, block = end_block, "final state reached");
                return Ok((output, end_block));
            }
        }
    }
}

async fn receive_until<S, B>(
    state: &mut S,
    block_counter: &B,
    height: u64,
    inbound: &mut mpsc::Receiver<S::Message>,
) -> Result<(), Error>
where
    S: State,
    B: BlockCounter + ?Sized,
{
    let wait = block_counter.wait_for_block_height(height);
    tokio::pin!(wait);

    loop {
        tokio::select! {
            biased;

            message = inbound.recv() => match message {
                Some(message) => {
                    if let Err(err) = state.receive(message) {
                        warn!(
                            member = %state.member_index(),
                            state = state.name(),
                            %err,
                            "dropping message"
                        );
                    }
                }
                None => return Err(Error::ChannelClosed),
            },
            result = &mut wait => {
                result?;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::Mutex;

    use super::*;
    use crate::{chain::BlockCounter, local::LocalBlockCounter};

    type Log = Arc<Mutex<Vec<(&'static str, u64)>>>;

    /// A state that records the blocks at which it initiates and the
    /// messages it receives.
    struct ScriptedState {
        script: Vec<(&'static str, u64, u64)>,
        step: usize,
        counter: Arc<LocalBlockCounter>,
        log: Log,
        received: Vec<u32>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl State for ScriptedState {
        type Message = u32;
        type Output = Vec<u32>;

        fn name(&self) -> &'static str {
            self.script[self.step].0
        }

        fn delay_blocks(&self) -> u64 {
            self.script[self.step].1
        }

        fn active_blocks(&self) -> u64 {
            self.script[self.step].2
        }

        fn member_index(&self) -> MemberIndex {
            MemberIndex::new(1).unwrap()
        }

        async fn initiate(&mut self) -> Result<(), Error> {
            if self.fail_on == Some(self.name()) {
                return Err(Error::EncryptionError);
            }
            let block = self.counter.current_block().await?;
            self.log.lock().await.push((self.name(), block));
            Ok(())
        }

        fn receive(&mut self, message: u32) -> Result<(), Error> {
            if message == 0 {
                return Err(Error::DeserializationError);
            }
            self.received.push(message);
            Ok(())
        }

        fn next(mut self) -> Result<Transition<Self, Vec<u32>>, Error> {
            if self.step + 1 == self.script.len() {
                Ok(Transition::Done(self.received))
            } else {
                self.step += 1;
                Ok(Transition::Next(self))
            }
        }
    }

    fn scripted(
        counter: &Arc<LocalBlockCounter>,
        script: Vec<(&'static str, u64, u64)>,
    ) -> (ScriptedState, Log) {
        let log = Log::default();
        let state = ScriptedState {
            script,
            step: 0,
            counter: counter.clone(),
            log: log.clone(),
            received: Vec::new(),
            fail_on: None,
        };
        (state, log)
    }

    #[tokio::test(start_paused = true)]
    async fn paces_states_by_blocks() {
        let counter = Arc::new(LocalBlockCounter::with_block_time(Duration::from_secs(1)));
        let (state, log) = scripted(
            &counter,
            vec![("first", 1, 5), ("silent", 0, 0), ("second", 2, 3)],
        );
        let (_tx, mut rx) = mpsc::channel(8);

        let (_, end_block) = execute(state, counter.as_ref(), 10, &mut rx)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().await,
            vec![("first", 11), ("silent", 16), ("second", 18)]
        );
        assert_eq!(end_block, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn drops_rejected_messages() {
        let counter = Arc::new(LocalBlockCounter::with_block_time(Duration::from_secs(1)));
        let (state, _) = scripted(&counter, vec![("only", 1, 1)]);
        let (tx, mut rx) = mpsc::channel(8);
        for message in [7, 0, 9] {
            tx.send(message).await.unwrap();
        }

        let (received, _) = execute(state, counter.as_ref(), 0, &mut rx).await.unwrap();

        assert_eq!(received, vec![7, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_initiate_failure() {
        let counter = Arc::new(LocalBlockCounter::with_block_time(Duration::from_secs(1)));
        let (mut state, _) = scripted(&counter, vec![("first", 0, 1), ("broken", 1, 1)]);
        state.fail_on = Some("broken");
        let (_tx, mut rx) = mpsc::channel(8);

        let err = execute(state, counter.as_ref(), 0, &mut rx)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to initiate state [broken]: Could not encrypt share."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancels_on_closed_channel() {
        let counter = Arc::new(LocalBlockCounter::with_block_time(Duration::from_secs(1)));
        let (state, _) = scripted(&counter, vec![("only", 1, 5)]);
        let (tx, mut rx) = mpsc::channel::<u32>(8);
        drop(tx);

        let err = execute(state, counter.as_ref(), 0, &mut rx)
            .await
            .unwrap_err();

        assert_eq!(err, Error::ChannelClosed);
    }
}
