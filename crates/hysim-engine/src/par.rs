//! # hysim-engine::par
//!
//! A speculative parallel simulator. Every atomic component gets its own
//! logical process that computes outputs and internal transitions
//! optimistically, checkpointing state as it goes. Execution alternates
//! two barriered phases: an output phase that publishes speculative
//! messages and reduces a global virtual time (GVT), and a state phase
//! that consumes inputs at GVT, rolls back and cancels where speculation
//! was wrong, transitions, and garbage-collects everything the advancing
//! GVT has committed. Locks guard only each process's pending-input
//! queue; all other state is confined to its process within a phase.

use std::any::Any;
use std::sync::Mutex;

use rayon::prelude::*;

use hysim_types::errors::SimError;
use hysim_types::id::ComponentId;
use hysim_types::pin::{Pin, PinValue};
use hysim_types::time::Time;

use crate::coupled::Network;
use crate::graph::{Graph, Topology};
use crate::model::Component;

/// A speculative message between logical processes.
#[derive(Clone)]
struct Message<X, T> {
    /// Sending logical process.
    src: usize,
    /// Receiving logical process.
    dst: usize,
    /// The sender's event time when the value was produced.
    time: T,
    value: PinValue<X>,
}

struct Checkpoint<T> {
    time: T,
    saved: Box<dyn Any + Send>,
}

/// Everything a logical process owns besides its inbox. Touched only by
/// the thread running the process within a phase.
struct LpCell<X, T: Time> {
    model: Component<X, T>,
    /// The component's id in the original graph.
    id: ComponentId,
    tl: T,
    tn: T,
    inputs: Vec<PinValue<X>>,
    outputs: Vec<PinValue<X>>,
    compute_output: bool,
    /// False when the model cannot save state; such a process only
    /// transitions at GVT and never rolls back.
    speculative: bool,
    /// State history, oldest first, never empty while speculative.
    checkpoints: Vec<Checkpoint<T>>,
    /// Speculatively sent output, ordered by time stamp.
    sent: Vec<Message<X, T>>,
}

struct Lp<X, T: Time> {
    cell: Mutex<LpCell<X, T>>,
    /// Pending input, ordered by time stamp. The only cross-process
    /// contention point.
    inbox: Mutex<Vec<Message<X, T>>>,
}

/// Insert keeping the list sorted by time, after existing entries with
/// the same stamp.
fn insert_by_time<X, T: Time>(list: &mut Vec<Message<X, T>>, msg: Message<X, T>) {
    let at = list
        .iter()
        .position(|m| msg.time < m.time)
        .unwrap_or(list.len());
    list.insert(at, msg);
}

/// The speculative, checkpoint-based parallel engine.
///
/// The graph is consumed (its topology becomes the shared read-only
/// routing table) and can be reassembled with
/// [`ParallelSimulator::into_graph`] to read final model state. Mealy
/// components are rejected.
pub struct ParallelSimulator<X, T: Time> {
    topology: Topology,
    lps: Vec<Lp<X, T>>,
    /// Component id to logical process index.
    lp_of: Vec<usize>,
    slot_count: usize,
    gvt: T,
}

impl<X, T> ParallelSimulator<X, T>
where
    X: Clone + Send + 'static,
    T: Time,
{
    pub fn new(graph: Graph<X, T>) -> Result<Self, SimError> {
        let slot_count = graph.slot_count();
        let (topology, components) = graph.into_parts();
        let mut sim = Self {
            topology,
            lps: Vec::new(),
            lp_of: vec![usize::MAX; slot_count],
            slot_count,
            gvt: T::zero(),
        };
        for (id, slot) in components.into_iter().enumerate() {
            let Some(component) = slot else { continue };
            sim.create_lp(id, component)?;
        }
        Ok(sim)
    }

    /// Flatten a hierarchical model and simulate it in parallel.
    pub fn from_network<N: Network<X, T>>(network: N) -> Result<Self, SimError> {
        let mut graph = Graph::new();
        network.assemble(&mut graph);
        Self::new(graph)
    }

    fn create_lp(&mut self, id: ComponentId, mut component: Component<X, T>) -> Result<(), SimError> {
        if component.is_mealy() {
            return Err(SimError::MealyUnsupported { component: id });
        }
        let mut checkpoints = Vec::new();
        let speculative = match component.atomic_mut().make_checkpoint() {
            Some(saved) => {
                checkpoints.push(Checkpoint {
                    time: T::zero(),
                    saved,
                });
                true
            }
            None => false,
        };
        let mut cell = LpCell {
            model: component,
            id,
            tl: T::zero(),
            tn: T::zero(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            compute_output: true,
            speculative,
            checkpoints,
            sent: Vec::new(),
        };
        Self::calculate_tn(&mut cell)?;
        self.lp_of[id] = self.lps.len();
        self.lps.push(Lp {
            cell: Mutex::new(cell),
            inbox: Mutex::new(Vec::new()),
        });
        Ok(())
    }

    /// The committed simulation time.
    pub fn gvt(&self) -> T {
        self.gvt
    }

    /// Run until the global virtual time exceeds `t_end`.
    pub fn exec_until(&mut self, t_end: T) -> Result<(), SimError> {
        loop {
            let gvt = self.output_and_gvt(t_end)?;
            self.gvt = gvt;
            self.state_change_and_garbage_collect(gvt, t_end)?;
            if !(gvt < t_end) {
                return Ok(());
            }
        }
    }

    /// Reassemble the graph, placing every model back in its slot.
    pub fn into_graph(self) -> Graph<X, T> {
        let mut components: Vec<Option<Component<X, T>>> =
            (0..self.slot_count).map(|_| None).collect();
        for lp in self.lps {
            let cell = lp.cell.into_inner().expect("lp state lock poisoned");
            components[cell.id] = Some(cell.model);
        }
        Graph::from_parts(self.topology, components)
    }

    fn calculate_tn(cell: &mut LpCell<X, T>) -> Result<(), SimError> {
        let time_advance = cell.model.atomic_mut().ta();
        if time_advance < T::zero() {
            return Err(SimError::NegativeTimeAdvance { component: cell.id });
        }
        if time_advance < T::inf() {
            cell.tn = cell.tl + time_advance;
        } else {
            cell.tn = time_advance;
        }
        Ok(())
    }

    /// Phase one: publish speculative output and reduce the GVT from
    /// every process's local virtual time.
    fn output_and_gvt(&self, t_end: T) -> Result<T, SimError> {
        self.lps
            .par_iter()
            .enumerate()
            .map(|(i, lp)| -> Result<T, SimError> {
                let mut cell = lp.cell.lock().expect("lp state lock poisoned");
                if cell.tn < t_end && cell.compute_output {
                    self.publish_output(i, &mut cell)?;
                    cell.compute_output = false;
                }
                let mut lvt = cell.tn;
                if let Some(front) = cell.sent.first() {
                    if front.time < lvt {
                        lvt = front.time;
                    }
                }
                Ok(lvt)
            })
            .try_reduce(T::inf, |a, b| Ok(if b < a { b } else { a }))
    }

    /// Compute one process's output at `tn` and push it into every
    /// recipient's inbox, recording the sends for later cancellation.
    fn publish_output(&self, i: usize, cell: &mut LpCell<X, T>) -> Result<(), SimError> {
        let time_stamp = cell.tn;
        let mut outputs = std::mem::take(&mut cell.outputs);
        cell.model.atomic_mut().output_func(&mut outputs);
        let mut targets: Vec<(Pin, ComponentId)> = Vec::new();
        for y in &outputs {
            targets.clear();
            self.topology.route(y.pin, &mut targets);
            for &(pin, consumer) in &targets {
                if consumer == cell.id {
                    return Err(SimError::SelfCoupling {
                        component: consumer,
                    });
                }
                let dst = self.lp_of[consumer];
                let msg = Message {
                    src: i,
                    dst,
                    time: time_stamp,
                    value: PinValue::new(pin, y.value.clone()),
                };
                {
                    let mut inbox = self.lps[dst].inbox.lock().expect("lp inbox lock poisoned");
                    insert_by_time(&mut inbox, msg.clone());
                }
                insert_by_time(&mut cell.sent, msg);
            }
        }
        outputs.clear();
        cell.outputs = outputs;
        Ok(())
    }

    /// Phase two: consume inputs at GVT, roll back or checkpoint, take
    /// the next state, and garbage-collect under the advanced GVT.
    fn state_change_and_garbage_collect(&self, gvt: T, t_end: T) -> Result<(), SimError> {
        self.lps
            .par_iter()
            .enumerate()
            .try_for_each(|(i, lp)| -> Result<(), SimError> {
                let mut cell = lp.cell.lock().expect("lp state lock poisoned");
                {
                    let mut inbox = lp.inbox.lock().expect("lp inbox lock poisoned");
                    while let Some(front) = inbox.first() {
                        debug_assert!(!(front.time < gvt), "stale message in inbox");
                        if front.time == gvt {
                            let msg = inbox.remove(0);
                            cell.inputs.push(msg.value);
                        } else {
                            break;
                        }
                    }
                }

                // Restore a checkpoint if the input lands in our past and
                // cancel speculative output; otherwise save the state the
                // input will overwrite.
                if !cell.inputs.is_empty() {
                    if gvt < cell.tl {
                        tracing::debug!(target: "par", lp = i, "rolling back state");
                        Self::rollback_state(&mut cell, gvt)?;
                    } else if cell.speculative {
                        Self::take_checkpoint(&mut cell)?;
                    }
                    self.rollback_output(&mut cell, gvt);
                } else if cell.speculative {
                    Self::take_checkpoint(&mut cell)?;
                }

                // Compute the next state.
                if cell.inputs.is_empty() {
                    let fire = cell.tn < t_end && (cell.speculative || cell.tn == gvt);
                    if fire {
                        cell.model.atomic_mut().delta_int();
                        cell.tl = cell.tn + T::epsilon();
                        Self::calculate_tn(&mut cell)?;
                        cell.compute_output = true;
                    }
                } else {
                    let inputs = std::mem::take(&mut cell.inputs);
                    if gvt < cell.tn {
                        let e = gvt - cell.tl;
                        cell.model.atomic_mut().delta_ext(e, &inputs);
                    } else {
                        cell.model.atomic_mut().delta_conf(&inputs);
                    }
                    let mut inputs = inputs;
                    inputs.clear();
                    cell.inputs = inputs;
                    cell.tl = gvt + T::epsilon();
                    Self::calculate_tn(&mut cell)?;
                    cell.compute_output = true;
                }

                Self::garbage_collect(&mut cell, gvt);
                Ok(())
            })
    }

    fn take_checkpoint(cell: &mut LpCell<X, T>) -> Result<(), SimError> {
        let time = cell.tl;
        match cell.model.atomic_mut().make_checkpoint() {
            Some(saved) => {
                cell.checkpoints.push(Checkpoint { time, saved });
                Ok(())
            }
            None => Err(SimError::CheckpointLost { component: cell.id }),
        }
    }

    /// Drop checkpoints newer than GVT and restore the latest survivor.
    fn rollback_state(cell: &mut LpCell<X, T>, gvt: T) -> Result<(), SimError> {
        while cell.checkpoints.last().is_some_and(|c| c.time > gvt) {
            cell.checkpoints.pop();
        }
        let restored_time = {
            let Some(checkpoint) = cell.checkpoints.last() else {
                return Err(SimError::CheckpointLost { component: cell.id });
            };
            cell.model
                .atomic_mut()
                .restore_checkpoint(checkpoint.saved.as_ref());
            checkpoint.time
        };
        cell.tl = restored_time;
        Self::calculate_tn(cell)
    }

    /// Withdraw speculative sends newer than GVT from their recipients'
    /// inboxes.
    fn rollback_output(&self, cell: &mut LpCell<X, T>, gvt: T) {
        while cell.sent.last().is_some_and(|m| m.time > gvt) {
            let Some(msg) = cell.sent.pop() else { break };
            let mut inbox = self.lps[msg.dst]
                .inbox
                .lock()
                .expect("lp inbox lock poisoned");
            if let Some(at) = inbox
                .iter()
                .position(|m| m.src == msg.src && m.time == msg.time)
            {
                inbox.remove(at);
            }
        }
    }

    /// Drop committed sends and checkpoints the advancing GVT can never
    /// roll back to.
    fn garbage_collect(cell: &mut LpCell<X, T>, gvt: T) {
        while cell.sent.first().is_some_and(|m| !(m.time > gvt)) {
            cell.sent.remove(0);
        }
        // Keep the newest checkpoint older than GVT; everything before it
        // is unreachable.
        loop {
            match (cell.checkpoints.first(), cell.checkpoints.get(1)) {
                (Some(c0), Some(c1)) if c0.time < gvt && c1.time < gvt => {
                    cell.checkpoints.remove(0);
                }
                _ => break,
            }
        }
        if cell.speculative {
            debug_assert!(!cell.checkpoints.is_empty());
        }
    }
}
