//! Mealy components: output as a function of incoming input, delivered
//! within the same instant, and the rejection of direct Mealy-to-Mealy
//! coupling.

use hysim_engine::prelude::*;

struct Pulse {
    period: f64,
    value: u32,
    pub out: Pin,
}

impl Atomic<u32, f64> for Pulse {
    fn ta(&mut self) -> f64 {
        self.period
    }
    fn delta_int(&mut self) {
        self.value += 1;
    }
    fn delta_ext(&mut self, _e: f64, _xb: &[PinValue<u32>]) {}
    fn delta_conf(&mut self, _xb: &[PinValue<u32>]) {
        self.delta_int();
    }
    fn output_func(&mut self, yb: &mut Vec<PinValue<u32>>) {
        yb.push(PinValue::new(self.out, self.value));
    }
}

/// Echoes every input in the same instant, doubled.
struct Echo {
    pub out: Pin,
}

impl Atomic<u32, f64> for Echo {
    fn ta(&mut self) -> f64 {
        f64::INFINITY
    }
    fn delta_int(&mut self) {}
    fn delta_ext(&mut self, _e: f64, _xb: &[PinValue<u32>]) {}
    fn delta_conf(&mut self, _xb: &[PinValue<u32>]) {}
    fn output_func(&mut self, _yb: &mut Vec<PinValue<u32>>) {}
}

impl MealyAtomic<u32, f64> for Echo {
    fn external_output(&mut self, _e: f64, xb: &[PinValue<u32>], yb: &mut Vec<PinValue<u32>>) {
        for x in xb {
            yb.push(PinValue::new(self.out, 2 * x.value));
        }
    }
    fn confluent_output(&mut self, xb: &[PinValue<u32>], yb: &mut Vec<PinValue<u32>>) {
        for x in xb {
            yb.push(PinValue::new(self.out, 2 * x.value));
        }
    }
}

struct Sink {
    seen: Vec<u32>,
}

impl Atomic<u32, f64> for Sink {
    fn ta(&mut self) -> f64 {
        f64::INFINITY
    }
    fn delta_int(&mut self) {}
    fn delta_ext(&mut self, _e: f64, xb: &[PinValue<u32>]) {
        self.seen.extend(xb.iter().map(|x| x.value));
    }
    fn delta_conf(&mut self, xb: &[PinValue<u32>]) {
        self.delta_ext(0.0, xb);
    }
    fn output_func(&mut self, _yb: &mut Vec<PinValue<u32>>) {}
}

#[test]
fn mealy_output_is_delivered_within_the_same_instant() {
    let mut graph: Graph<u32, f64> = Graph::new();

    let pulse = Pulse {
        period: 3.0,
        value: 7,
        out: Pin::new(),
    };
    let pulse_out = pulse.out;
    graph.add_atomic(pulse);

    let echo = Echo { out: Pin::new() };
    let echo_out = echo.out;
    let echo_id = graph.add_mealy(echo);
    graph.connect_component(pulse_out, echo_id);

    let sink_id = graph.add_atomic(Sink { seen: Vec::new() });
    graph.connect_component(echo_out, sink_id);

    let mut sim = Simulator::new(graph).unwrap();
    let (listener, events) = ChannelListener::unbounded();
    sim.add_event_listener(listener);

    sim.exec_next_event().unwrap();

    // The echo's output and the sink's input both happen at t = 3.
    let sink: &Sink = sim.graph().get(sink_id).unwrap();
    assert_eq!(sink.seen, vec![14]);
    let echo_outputs: Vec<(f64, u32)> = events
        .try_iter()
        .filter_map(|ev| match ev {
            ListenerEvent::Output { model, value, t } if model == echo_id => {
                Some((t, value.value))
            }
            _ => None,
        })
        .collect();
    assert_eq!(echo_outputs, vec![(3.0, 14)]);
}

#[test]
fn coupled_mealy_components_are_rejected() {
    let mut graph: Graph<u32, f64> = Graph::new();

    let pulse = Pulse {
        period: 1.0,
        value: 0,
        out: Pin::new(),
    };
    let pulse_out = pulse.out;
    graph.add_atomic(pulse);

    let first = Echo { out: Pin::new() };
    let first_out = first.out;
    let first_id = graph.add_mealy(first);
    graph.connect_component(pulse_out, first_id);

    let second = Echo { out: Pin::new() };
    let second_id = graph.add_mealy(second);
    graph.connect_component(first_out, second_id);

    let mut sim = Simulator::new(graph).unwrap();
    assert!(matches!(
        sim.exec_next_event(),
        Err(SimError::MealyCoupling { src, dst }) if src == first_id && dst == second_id
    ));
}
