//! Control-flow guided worklist decoding.
//!
//! Starting from the seeds, each path is decoded linearly until control flow
//! leaves it: a return, an indirect or unconditional jump, an interrupt, an
//! invalid instruction, or a fallthrough that would leave the current region.
//! Direct branch and call targets found on the way are queued as new paths.
//! Every address is decoded at most once across the whole run.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use tracing::{debug, trace};

use super::address::AddressSpace;
use super::decode::{DecodePrimitive, DecodedInstruction, FlowControlKind, InstructionCursor};
use super::report::{IssueKind, IssueLog, ProgressSnapshot, TraversalOutcome};
use super::Control;
use crate::config::SamplerConfig;

/// Running totals of one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub bytes_decoded: u64,
    pub instruction_count: u64,
    pub invalid_instruction_count: u64,
    pub outcome: TraversalOutcome,
}

impl Counters {
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_decoded: self.bytes_decoded,
            instruction_count: self.instruction_count,
            invalid_instruction_count: self.invalid_instruction_count,
        }
    }
}

/// Counters plus per-feature instruction counts.
#[derive(Debug, Clone)]
pub struct Traversal<F> {
    pub counters: Counters,
    pub features: HashMap<F, u64>,
}

impl<F> Traversal<F> {
    pub fn into_parts(self) -> (Counters, HashMap<F, u64>) {
        (self.counters, self.features)
    }
}

/// Mutable state owned by a single traversal.
struct Worklist<F> {
    counters: Counters,
    features: HashMap<F, u64>,
    visited: HashSet<u64>,
    queued: HashSet<u64>,
    stack: Vec<u64>,
}

impl<F: Copy + Eq + Hash> Worklist<F> {
    fn new(seeds: &[u64]) -> Self {
        Self {
            counters: Counters::default(),
            features: HashMap::new(),
            visited: HashSet::new(),
            queued: seeds.iter().copied().collect(),
            // Reversed so the first seed is popped first.
            stack: seeds.iter().rev().copied().collect(),
        }
    }

    /// Queue a branch target if it is decodable and not yet seen.
    fn enqueue(&mut self, space: &AddressSpace<'_>, target: u64) {
        let target = space.domain().normalize(target);
        if space.contains(target) && !self.visited.contains(&target) && self.queued.insert(target)
        {
            trace!(target = format_args!("{:#x}", target), "branch target queued");
            self.stack.push(target);
        }
    }

    fn merge_features(&mut self, features: &[F]) {
        for feature in features {
            *self.features.entry(*feature).or_insert(0) += 1;
        }
    }

    fn add_bytes(&mut self, length: usize, bytes_sampled: u64) {
        self.counters.bytes_decoded = self
            .counters
            .bytes_decoded
            .saturating_add(length as u64)
            .min(bytes_sampled);
    }

    fn finish(self) -> Traversal<F> {
        Traversal {
            counters: self.counters,
            features: self.features,
        }
    }
}

enum Step {
    Continue,
    Stop,
}

/// Decode everything reachable from `seeds`.
///
/// Never fails: undecodable paths end early and are recorded in `issues`.
/// Cancellation and the instruction budget stop the run with the counters
/// accumulated so far.
pub fn traverse<P: DecodePrimitive>(
    space: AddressSpace<'_>,
    primitive: &P,
    seeds: &[u64],
    bytes_sampled: u64,
    config: &SamplerConfig,
    control: &mut Control<'_>,
    issues: &mut IssueLog,
) -> Traversal<P::Feature> {
    let regions = space.regions();
    let mut cursors: Vec<P::Cursor<'_>> = regions
        .iter()
        .map(|r| primitive.cursor(&r.bytes, r.base_address))
        .collect();
    let mut work = Worklist::new(seeds);

    'outer: loop {
        if control.is_cancelled() {
            work.counters.outcome = TraversalOutcome::Cancelled;
            break;
        }
        let Some(start) = work.stack.pop() else {
            break;
        };
        let mut address = space.domain().normalize(start);
        if work.visited.contains(&address) {
            continue;
        }
        let Some(location) = space.resolve(address) else {
            issues.push(
                IssueKind::UnresolvedAddress,
                format!("{:#x} is outside every executable region", address),
            );
            continue;
        };
        let cursor = &mut cursors[location.region];
        if !cursor.seek(location.offset) {
            continue;
        }

        while cursor.has_remaining() {
            if control.is_cancelled() {
                work.counters.outcome = TraversalOutcome::Cancelled;
                break 'outer;
            }
            if let Some(limit) = config.max_instructions {
                if work.counters.instruction_count >= limit {
                    work.counters.outcome = TraversalOutcome::BudgetExhausted;
                    issues.push(
                        IssueKind::Budget,
                        format!("instruction budget of {} reached", limit),
                    );
                    break 'outer;
                }
            }
            // Paths that run into already decoded code end there.
            if work.visited.contains(&address) {
                break;
            }

            let insn = cursor.decode();
            work.counters.instruction_count += 1;
            work.visited.insert(address);
            work.visited.insert(space.domain().normalize(insn.address));

            if config.yield_interval > 0
                && work.counters.instruction_count % config.yield_interval == 0
            {
                control.report(&work.counters.snapshot());
            }

            match step(&mut work, &space, &insn, location.region, bytes_sampled, issues) {
                Step::Continue => address = space.domain().normalize(insn.next_address),
                Step::Stop => break,
            }
        }
    }

    debug!(
        instructions = work.counters.instruction_count,
        invalid = work.counters.invalid_instruction_count,
        bytes_decoded = work.counters.bytes_decoded,
        bytes_sampled,
        features = work.features.len(),
        outcome = ?work.counters.outcome,
        "traversal finished"
    );
    work.finish()
}

/// Account for one decoded instruction and decide whether its path goes on.
fn step<F: Copy + Eq + Hash>(
    work: &mut Worklist<F>,
    space: &AddressSpace<'_>,
    insn: &DecodedInstruction<F>,
    region: usize,
    bytes_sampled: u64,
    issues: &mut IssueLog,
) -> Step {
    if insn.length == 0 {
        work.counters.invalid_instruction_count += 1;
        issues.push(
            IssueKind::ZeroLengthInstruction,
            format!("{:#x}: decoder made no progress", insn.address),
        );
        return Step::Stop;
    }
    work.add_bytes(insn.length, bytes_sampled);

    if !insn.is_valid {
        work.counters.invalid_instruction_count += 1;
        issues.push(
            IssueKind::InvalidInstruction,
            format!("{:#x}: invalid instruction", insn.address),
        );
        return Step::Stop;
    }
    if insn.flow == FlowControlKind::Exception {
        work.counters.invalid_instruction_count += 1;
        issues.push(
            IssueKind::Exception,
            format!("{:#x}: faulting instruction", insn.address),
        );
        return Step::Stop;
    }
    if insn.flow != FlowControlKind::Trap {
        work.merge_features(insn.features);
    }

    if let Some(target) = insn.branch_target {
        if matches!(
            insn.flow,
            FlowControlKind::UnconditionalBranch
                | FlowControlKind::ConditionalBranch
                | FlowControlKind::Call
                | FlowControlKind::SpecialTransaction
        ) {
            work.enqueue(space, target);
        }
    }
    if !insn.flow.falls_through() {
        return Step::Stop;
    }

    // Fallthrough never crosses into another region.
    match space.resolve(insn.next_address) {
        Some(next) if next.region == region => Step::Continue,
        _ => Step::Stop,
    }
}
