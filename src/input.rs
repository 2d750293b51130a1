//! Sources of new outgoing messages for the interactive peer.

use crate::{log, poisson::Poisson, NodeId};
use async_trait::async_trait;
use color_print::cformat;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::{
    collections::VecDeque,
    io::{self, BufRead, Write},
    thread,
    time::Duration,
};
use tokio::sync::mpsc;

/// A message the interactive peer was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub destination: NodeId,
    pub body: Vec<u8>,
}

impl Outgoing {
    pub fn new(destination: NodeId, body: impl Into<Vec<u8>>) -> Self {
        Self {
            destination,
            body: body.into(),
        }
    }
}

/// Consulted by the interactive peer each time it holds an empty slot.
#[async_trait]
pub trait InputProvider: Send {
    /// Returns `None` when there is nothing to send.
    async fn prompt_for_outgoing(&mut self, ring_size: usize) -> Option<Outgoing>;
}

/// Provider that never sends anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

#[async_trait]
impl InputProvider for NoInput {
    async fn prompt_for_outgoing(&mut self, _ring_size: usize) -> Option<Outgoing> {
        None
    }
}

/// Provider that asks a human on the terminal.
///
/// Lines are read on a dedicated thread so a pending prompt never holds up
/// the runtime and can be abandoned when the ring shuts down.
pub struct StdinInput {
    lines: mpsc::UnboundedReceiver<String>,
    exhausted: bool,
}

impl StdinInput {
    pub fn new() -> Self {
        let (tx, lines) = mpsc::unbounded_channel();

        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self::from_lines(lines)
    }

    fn from_lines(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            lines,
            exhausted: false,
        }
    }

    /// Once input has ended the prompt never answers, like a human who walked away.
    async fn next_line(&mut self) -> String {
        if !self.exhausted {
            if let Some(line) = self.lines.recv().await {
                return line;
            }
            self.exhausted = true;
            log::warn("Input closed; node 0 keeps the apple until the ring is interrupted.");
        }
        futures::future::pending().await
    }

    fn prompt(text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputProvider for StdinInput {
    async fn prompt_for_outgoing(&mut self, ring_size: usize) -> Option<Outgoing> {
        if self.exhausted {
            return futures::future::pending().await;
        }

        Self::prompt("Enter message to send (empty to send nothing): ");
        let body = self.next_line().await;
        if body.is_empty() {
            log::info("No message entered; leaving the slot empty.");
            return None;
        }

        Self::prompt(&format!(
            "Enter destination node id (0 .. {}): ",
            ring_size - 1
        ));
        let answer = self.next_line().await;
        match parse_destination(&answer, ring_size) {
            Some(destination) => Some(Outgoing::new(destination, body)),
            None => {
                log::warn(&cformat!(
                    "Invalid destination <bold>{}</bold>. Message not sent.",
                    answer.trim()
                ));
                None
            }
        }
    }
}

/// Function that parses a destination typed by a human, accepting only `[0, ring_size)`.
pub fn parse_destination(text: &str, ring_size: usize) -> Option<NodeId> {
    text.trim()
        .parse::<NodeId>()
        .ok()
        .filter(|node| *node < ring_size)
}

/// Provider that replays a fixed script, one step per prompt, then stays silent forever.
///
/// Once the script runs out the interactive peer keeps the apple, exactly like
/// a human who never answers the prompt.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    steps: VecDeque<Option<Outgoing>>,
}

impl ScriptedInput {
    pub fn new(steps: impl IntoIterator<Item = Option<Outgoing>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl InputProvider for ScriptedInput {
    async fn prompt_for_outgoing(&mut self, _ring_size: usize) -> Option<Outgoing> {
        match self.steps.pop_front() {
            Some(step) => step,
            None => futures::future::pending().await,
        }
    }
}

const WORDS: [&str; 8] = [
    "apple", "orchard", "harvest", "cider", "blossom", "core", "seed", "basket",
];

/// Autopilot provider: a seeded Poisson process decides when to send a random
/// message to a random node. Each prompt advances the clock by one visit.
pub struct RandomInput {
    arrivals: Poisson<SmallRng>,
    rng: SmallRng,
    clock: f64,
    next_event: f64,
    think_time: Duration,
}

impl RandomInput {
    /// `rate` is the mean number of messages per visit of the interactive peer.
    pub fn new(rate: f64, seed: u64) -> Self {
        let mut arrivals = Poisson::new(rate, seed);
        let next_event = arrivals.time_for_next_event();

        Self {
            arrivals,
            rng: SmallRng::seed_from_u64(seed.wrapping_add(1)),
            clock: 0.0,
            next_event,
            think_time: Duration::ZERO,
        }
    }

    /// Function that makes every prompt take `think_time`, like a human typing.
    pub fn with_think_time(mut self, think_time: Duration) -> Self {
        self.think_time = think_time;
        self
    }

    fn generate(&mut self, ring_size: usize) -> Outgoing {
        let destination = self.rng.random_range(0..ring_size);
        let count = self.rng.random_range(1..=3);
        let body = (0..count)
            .map(|_| WORDS[self.rng.random_range(0..WORDS.len())])
            .collect::<Vec<_>>()
            .join(" ");

        Outgoing::new(destination, body)
    }
}

#[async_trait]
impl InputProvider for RandomInput {
    async fn prompt_for_outgoing(&mut self, ring_size: usize) -> Option<Outgoing> {
        if !self.think_time.is_zero() {
            tokio::time::sleep(self.think_time).await;
        }

        self.clock += 1.0;
        if self.clock < self.next_event {
            return None;
        }

        while self.next_event <= self.clock {
            self.next_event += self.arrivals.time_for_next_event();
        }
        Some(self.generate(ring_size))
    }
}
