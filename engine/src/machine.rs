use crate::expr::{truthy, Expr, Scope};
use common::Record;
use errors::{MachineError, Result};
use log::error;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

pub const TAG: &str = "fsm";

#[derive(Debug)]
struct Transition {
    when: Expr,
    goto: usize,
}

#[derive(Debug)]
struct Instance {
    name: String,
    inputs: BTreeMap<String, String>,
    output_key: Option<String>,
    current: usize,
    entered_at_ms: f64,
}

/// Configuration-defined FSM evaluator.
///
/// Several independent instances run over the same state graph; each record
/// drives up to `passes` chained transitions per instance and gets the
/// resulting state written into its `data`.
#[derive(Debug)]
pub struct Machine {
    state_names: Vec<String>,
    transitions: Vec<Vec<Transition>>,
    instances: Vec<Instance>,
    constants: Map<String, Value>,
    passes: usize,
}

impl Machine {
    /// Parses the `states` / `instances` / `constants` / `passes` sections.
    ///
    /// State declaration order matters twice: transition lists evaluate in
    /// order, and the first declared state is the fallback initial state.
    pub fn from_value(config: &Value, now_ms: f64) -> Result<Machine> {
        let states_cfg = config
            .get("states")
            .and_then(Value::as_object)
            .ok_or(MachineError::NoStates)?;
        if states_cfg.is_empty() {
            return Err(MachineError::NoStates.into());
        }

        let state_names: Vec<String> = states_cfg.keys().cloned().collect();
        let index_of = |name: &str| -> Result<usize> {
            state_names
                .iter()
                .position(|s| s == name)
                .ok_or_else(|| MachineError::UnknownState(name.to_string()).into())
        };

        let mut transitions = Vec::with_capacity(state_names.len());
        for (state, cfg) in states_cfg {
            let mut parsed = Vec::new();
            let list = cfg
                .get("transitions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for item in list {
                let when_src = item.get("when").and_then(Value::as_str).ok_or_else(|| {
                    MachineError::BadTransition {
                        state: state.clone(),
                        message: "missing when".to_string(),
                    }
                })?;
                let goto_name = item
                    .get("action")
                    .and_then(|a| a.get("goto"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| MachineError::BadTransition {
                        state: state.clone(),
                        message: "missing action.goto".to_string(),
                    })?;
                parsed.push(Transition {
                    when: Expr::parse(when_src)?,
                    goto: index_of(goto_name)?,
                });
            }
            transitions.push(parsed);
        }

        let mut instances = Vec::new();
        if let Some(instances_cfg) = config.get("instances").and_then(Value::as_object) {
            for (name, cfg) in instances_cfg {
                let initial = match cfg
                    .get("initial_state")
                    .or_else(|| cfg.get("initialState"))
                    .and_then(Value::as_str)
                {
                    Some(state) => index_of(state)?,
                    None => 0,
                };
                let inputs = cfg
                    .get("inputs")
                    .and_then(Value::as_object)
                    .map(|map| {
                        map.iter()
                            .filter_map(|(alias, field)| {
                                field.as_str().map(|f| (alias.clone(), f.to_string()))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let output_key = cfg
                    .get("outputs")
                    .and_then(|o| o.get("state"))
                    .and_then(Value::as_str)
                    .map(String::from);
                instances.push(Instance {
                    name: name.clone(),
                    inputs,
                    output_key,
                    current: initial,
                    entered_at_ms: now_ms,
                });
            }
        }

        let constants = config
            .get("constants")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let passes = config
            .get("passes")
            .and_then(Value::as_u64)
            .map(|p| p.max(1) as usize)
            .unwrap_or(1);

        Ok(Machine {
            state_names,
            transitions,
            instances,
            constants,
            passes,
        })
    }

    pub fn instance_state(&self, name: &str) -> Option<&str> {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .map(|i| self.state_names[i.current].as_str())
    }

    pub fn on_record(&mut self, mut record: Record, now_ms: f64) -> Record {
        let record_now = record.timestamp().filter(|t| t.is_finite()).unwrap_or(now_ms);

        // Counted once per record, before any instance moves.
        let mut counts: HashMap<String, i64> =
            self.state_names.iter().map(|s| (s.clone(), 0)).collect();
        for instance in &self.instances {
            *counts
                .entry(self.state_names[instance.current].clone())
                .or_insert(0) += 1;
        }

        for idx in 0..self.instances.len() {
            for _ in 0..self.passes {
                let current = self.instances[idx].current;
                let fired = {
                    let instance = &self.instances[idx];
                    let scope = MachineScope {
                        data: &record.data,
                        inputs: &instance.inputs,
                        state_name: &self.state_names[current],
                        entered_at_ms: instance.entered_at_ms,
                        now_ms: record_now,
                        counts: &counts,
                        constants: &self.constants,
                    };
                    let mut fired = None;
                    for transition in &self.transitions[current] {
                        match transition.when.eval(&scope) {
                            Ok(value) => {
                                if truthy(&value) {
                                    fired = Some(transition.goto);
                                    break;
                                }
                            }
                            Err(err) => {
                                // A failing condition never fires.
                                error!(
                                    "instance {}: {} failed: {err}",
                                    instance.name,
                                    transition.when.source()
                                );
                            }
                        }
                    }
                    fired
                };
                match fired {
                    Some(goto) => {
                        self.instances[idx].current = goto;
                        self.instances[idx].entered_at_ms = record_now;
                    }
                    None => break,
                }
            }
        }

        for instance in &self.instances {
            if let Some(key) = &instance.output_key {
                record.data.insert(
                    key.clone(),
                    Value::String(self.state_names[instance.current].clone()),
                );
            }
        }

        record.append_tag(TAG);
        record
    }
}

struct MachineScope<'a> {
    data: &'a Map<String, Value>,
    inputs: &'a BTreeMap<String, String>,
    state_name: &'a str,
    entered_at_ms: f64,
    now_ms: f64,
    counts: &'a HashMap<String, i64>,
    constants: &'a Map<String, Value>,
}

impl Scope for MachineScope<'_> {
    fn lookup(&self, ident: &str) -> Option<Value> {
        if let Some(alias) = ident.strip_prefix("data.") {
            let field = self.inputs.get(alias)?;
            return self.data.get(field).cloned();
        }
        if ident == "instance.state" {
            return Some(Value::String(self.state_name.to_string()));
        }
        if ident == "instance.timeInStateMs" {
            return serde_json::Number::from_f64(self.now_ms - self.entered_at_ms)
                .map(Value::Number);
        }
        if let Some(state) = ident.strip_prefix("instancesInState.") {
            return self.counts.get(state).map(|n| Value::from(*n));
        }
        if let Some(name) = ident.strip_prefix("constant.") {
            return self.constants.get(name).cloned();
        }
        None
    }
}
