use crate::expr::{truthy, Expr};
use common::record::json_number;
use common::Record;
use errors::{ConfigError, Result, RuleError};
use log::{error, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const TAG: &str = "red";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    #[default]
    Ignore,
    Zero,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardPolicy {
    #[default]
    All,
    Known,
}

#[derive(Debug, Deserialize)]
struct RuleCfg {
    name: String,
    op: String,
    #[serde(default)]
    inputs: Value,
    #[serde(default)]
    expr: Option<String>,
    #[serde(default)]
    temp: bool,
    #[serde(default)]
    retain: bool,
}

#[derive(Debug, Deserialize)]
struct ReducerCfg {
    #[serde(default)]
    rules: Vec<RuleCfg>,
    #[serde(default)]
    missing: MissingPolicy,
    #[serde(default = "default_passes")]
    passes: usize,
    #[serde(default, alias = "forwardPolicy")]
    forward_policy: ForwardPolicy,
}

fn default_passes() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggKind {
    Sum,
    Sub,
    Avg,
    Max,
    Min,
    Range,
}

#[derive(Debug)]
enum Op {
    Copy { src: String },
    Agg { kind: AggKind, fields: Vec<String> },
    WeightedAvg { weights: Vec<(String, f64)> },
    Expr { locals: Vec<(String, String)>, expr: Expr, condition: bool },
    Passthrough { src: String },
}

#[derive(Debug)]
struct Rule {
    name: String,
    op: Op,
    temp: bool,
    retain: bool,
}

/// Multi-pass expression/aggregation engine.
///
/// Rules sweep the working map in declaration order `passes` times, so
/// later rules consume earlier outputs. Internal locals (`__timestamp`,
/// `__now`, `__start`) are seeded per record and never emitted.
#[derive(Debug)]
pub struct Reducer {
    rules: Vec<Rule>,
    temp_names: HashSet<String>,
    missing: MissingPolicy,
    passes: usize,
    forward: ForwardPolicy,
    retained: Map<String, Value>,
    start_ms: Option<f64>,
}

impl Reducer {
    pub fn from_value(config: &Value) -> Result<Reducer> {
        let cfg: ReducerCfg = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::Invalid(format!("reducer config: {e}")))?;

        let mut rules = Vec::with_capacity(cfg.rules.len());
        let mut temp_names = HashSet::new();
        for rule in cfg.rules {
            if rule.temp {
                temp_names.insert(rule.name.clone());
            }
            let op = parse_op(&rule)?;
            rules.push(Rule {
                name: rule.name,
                op,
                temp: rule.temp,
                retain: rule.retain,
            });
        }

        Ok(Reducer {
            rules,
            temp_names,
            missing: cfg.missing,
            passes: cfg.passes.max(1),
            forward: cfg.forward_policy,
            retained: Map::new(),
            start_ms: None,
        })
    }

    pub fn on_record(&mut self, record: Record, now_ms: f64) -> Option<Record> {
        let start = *self.start_ms.get_or_insert(now_ms);

        let mut working = record.data.clone();

        // First-record retention seeding: the prev slot starts from the
        // current input when present, else 0 under missing:"zero".
        for rule in self.rules.iter().filter(|r| r.retain) {
            let key = format!("{}__prev", rule.name);
            if !self.retained.contains_key(&key) {
                if let Some(value) = working.get(&rule.name) {
                    self.retained.insert(key, value.clone());
                } else if self.missing == MissingPolicy::Zero {
                    self.retained.insert(key, json_number(0.0));
                }
            }
        }
        for (key, value) in &self.retained {
            working.insert(key.clone(), value.clone());
        }

        working.insert(
            "__timestamp".to_string(),
            record.timestamp().map(json_number).unwrap_or(Value::Null),
        );
        working.insert("__now".to_string(), json_number(now_ms));
        working.insert("__start".to_string(), json_number(start));

        for _ in 0..self.passes {
            for index in 0..self.rules.len() {
                let rule = &self.rules[index];
                match compute(rule, self.missing, &working) {
                    Ok(Some(value)) => {
                        working.insert(rule.name.clone(), value);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!("dropping record: {err}");
                        return None;
                    }
                }
            }
        }

        for rule in self.rules.iter().filter(|r| r.retain) {
            if let Some(value) = working.get(&rule.name) {
                self.retained
                    .insert(format!("{}__prev", rule.name), value.clone());
            }
        }

        let mut data = Map::new();
        match self.forward {
            ForwardPolicy::All => {
                for (key, value) in working {
                    if !key.starts_with("__") && !self.temp_names.contains(&key) {
                        data.insert(key, value);
                    }
                }
            }
            ForwardPolicy::Known => {
                for rule in &self.rules {
                    if rule.temp {
                        continue;
                    }
                    if let Some(value) = working.get(&rule.name) {
                        data.insert(rule.name.clone(), value.clone());
                    }
                }
            }
        }

        let mut out = Record {
            meta: record.meta,
            data,
        };
        out.append_tag(TAG);
        Some(out)
    }
}

fn parse_op(rule: &RuleCfg) -> Result<Op> {
    let bad = |message: &str| -> errors::Error {
        RuleError::BadInputs {
            rule: rule.name.clone(),
            message: message.to_string(),
        }
        .into()
    };

    let agg = |kind: AggKind| -> Result<Op> {
        let fields = rule
            .inputs
            .as_array()
            .ok_or_else(|| bad("expected an array of field names"))?
            .iter()
            .map(|v| v.as_str().map(String::from))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| bad("field names must be strings"))?;
        Ok(Op::Agg { kind, fields })
    };

    let locals = || -> Result<Vec<(String, String)>> {
        rule.inputs
            .as_object()
            .ok_or_else(|| bad("expected a mapping of local aliases"))?
            .iter()
            .map(|(alias, field)| {
                field
                    .as_str()
                    .map(|f| (alias.clone(), f.to_string()))
                    .ok_or_else(|| bad("source fields must be strings"))
            })
            .collect()
    };

    match rule.op.as_str() {
        "copy" => {
            let src = match &rule.inputs {
                Value::String(s) => s.clone(),
                other => other
                    .get("src")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .ok_or_else(|| bad("copy needs inputs.src"))?,
            };
            Ok(Op::Copy { src })
        }
        "sum" => agg(AggKind::Sum),
        "sub" => agg(AggKind::Sub),
        "avg" => agg(AggKind::Avg),
        "max" => agg(AggKind::Max),
        "min" => agg(AggKind::Min),
        "range" => agg(AggKind::Range),
        "weighted_avg" => {
            let weights = rule
                .inputs
                .as_object()
                .ok_or_else(|| bad("expected a field-to-weight mapping"))?
                .iter()
                .map(|(field, weight)| {
                    weight
                        .as_f64()
                        .map(|w| (field.clone(), w))
                        .ok_or_else(|| bad("weights must be numeric"))
                })
                .collect::<Result<Vec<(String, f64)>>>()?;
            Ok(Op::WeightedAvg { weights })
        }
        "expr" | "condition" => {
            let source = rule
                .expr
                .as_deref()
                .ok_or_else(|| bad("expr rules need an expr string"))?;
            Ok(Op::Expr {
                locals: locals()?,
                expr: Expr::parse(source)?,
                condition: rule.op == "condition",
            })
        }
        "passthrough" => {
            let src = match &rule.inputs {
                Value::String(s) => s.clone(),
                _ => locals()?
                    .first()
                    .map(|(_, field)| field.clone())
                    .ok_or_else(|| bad("passthrough needs one local"))?,
            };
            Ok(Op::Passthrough { src })
        }
        other => Err(RuleError::UnknownOp(other.to_string()).into()),
    }
}

/// Resolves one input field under the missing-value policy.
fn fetch(
    rule: &str,
    field: &str,
    missing: MissingPolicy,
    working: &Map<String, Value>,
) -> Result<Option<Value>> {
    match working.get(field) {
        Some(value) if !value.is_null() => Ok(Some(value.clone())),
        _ => match missing {
            MissingPolicy::Ignore => Ok(None),
            MissingPolicy::Zero => Ok(Some(json_number(0.0))),
            MissingPolicy::Fail => Err(RuleError::MissingInput {
                rule: rule.to_string(),
                input: field.to_string(),
            }
            .into()),
        },
    }
}

fn fetch_num(
    rule: &str,
    field: &str,
    missing: MissingPolicy,
    working: &Map<String, Value>,
) -> Result<Option<f64>> {
    match fetch(rule, field, missing, working)? {
        Some(value) => match value.as_f64() {
            Some(n) => Ok(Some(n)),
            // Present but non-numeric reads like an absent numeric input.
            None => match missing {
                MissingPolicy::Ignore => Ok(None),
                MissingPolicy::Zero => Ok(Some(0.0)),
                MissingPolicy::Fail => Err(RuleError::MissingInput {
                    rule: rule.to_string(),
                    input: field.to_string(),
                }
                .into()),
            },
        },
        None => Ok(None),
    }
}

fn compute(rule: &Rule, missing: MissingPolicy, working: &Map<String, Value>) -> Result<Option<Value>> {
    match &rule.op {
        Op::Copy { src } | Op::Passthrough { src } => fetch(&rule.name, src, missing, working),
        Op::Agg { kind, fields } => {
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                if let Some(n) = fetch_num(&rule.name, field, missing, working)? {
                    values.push(n);
                }
            }
            if values.is_empty() {
                return Ok(None);
            }
            let result = match kind {
                AggKind::Sum => values.iter().sum(),
                AggKind::Sub => values[0] - values[1..].iter().sum::<f64>(),
                AggKind::Avg => values.iter().sum::<f64>() / values.len() as f64,
                AggKind::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                AggKind::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
                AggKind::Range => {
                    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                    max - min
                }
            };
            Ok(Some(json_number(result)))
        }
        Op::WeightedAvg { weights } => {
            let mut weight_sum = 0.0;
            let mut value_sum = 0.0;
            for (field, weight) in weights {
                if let Some(n) = fetch_num(&rule.name, field, missing, working)? {
                    weight_sum += weight;
                    value_sum += weight * n;
                }
            }
            if weight_sum == 0.0 {
                return Ok(None);
            }
            Ok(Some(json_number(value_sum / weight_sum)))
        }
        Op::Expr {
            locals,
            expr,
            condition,
        } => {
            let mut scope = Map::new();
            for (alias, field) in locals {
                match fetch(&rule.name, field, missing, working)? {
                    Some(value) => {
                        scope.insert(alias.clone(), value);
                    }
                    None => {
                        scope.insert(alias.clone(), Value::Null);
                    }
                }
            }
            let value = match expr.eval(&scope) {
                Ok(value) => value,
                Err(err) => {
                    error!("rule {}: {} failed: {err}", rule.name, expr.source());
                    Value::Null
                }
            };
            if *condition {
                if value.is_null() {
                    return Ok(None);
                }
                return Ok(Some(Value::Bool(truthy(&value))));
            }
            if value.is_null() {
                return Ok(None);
            }
            Ok(Some(value))
        }
    }
}
