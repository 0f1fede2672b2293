//! Shared simulation context and netlist loading.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::circuit::{BitWidth, Circuit, ComponentId, Location, Value, Wire};
use crate::components::{
    Clock, Component, Constant, Gate, GateKind, Pin, PullResistor, Splitter, SubcircuitInstance, Tunnel,
};
use crate::dsl::{parse_mapping, CircuitDef, ComponentDef, ComponentKind, NetlistAst};
use crate::error::{GatesimError, Result};
use crate::owner::OwnerHandle;
use crate::txn::Transaction;

/// Process-wide counters and the owner role shared by every circuit of a
/// project.
#[derive(Debug, Clone)]
pub struct SimContext {
    serial: Arc<AtomicU64>,
    ids: Arc<AtomicU64>,
    owner: OwnerHandle,
}

impl SimContext {
    /// Context with a dedicated owner thread for bundle-map recomputation.
    pub fn new() -> Result<Self> {
        Ok(Self::with_owner(OwnerHandle::spawn()?))
    }

    /// Context whose owner role runs on whichever thread asks.
    pub fn inline() -> Self {
        Self::with_owner(OwnerHandle::inline())
    }

    fn with_owner(owner: OwnerHandle) -> Self {
        Self {
            serial: Arc::new(AtomicU64::new(1)),
            ids: Arc::new(AtomicU64::new(1)),
            owner,
        }
    }

    /// Next circuit lock serial. Serials fix the global lock order.
    pub fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_component_id(&self) -> ComponentId {
        ComponentId(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    pub fn owner(&self) -> &OwnerHandle {
        &self.owner
    }
}

/// Circuits built from one netlist.
#[derive(Debug)]
pub struct Project {
    circuits: BTreeMap<String, Arc<Circuit>>,
    order: Vec<String>,
    main: String,
}

impl Project {
    /// Build every circuit of `ast`, children before parents.
    pub fn from_ast(ast: &NetlistAst, ctx: &SimContext) -> Result<Self> {
        let mut defs: HashMap<&str, &CircuitDef> = HashMap::new();
        for def in &ast.circuits {
            if defs.insert(def.name.as_str(), def).is_some() {
                return Err(GatesimError::DuplicateCircuit { name: def.name.clone() });
            }
        }
        let main = ast
            .main_name()
            .ok_or_else(|| GatesimError::topology("netlist defines no circuits"))?
            .to_string();
        if !defs.contains_key(main.as_str()) {
            return Err(GatesimError::UnknownCircuit { name: main });
        }

        let order = build_order(ast, &defs)?;
        let mut circuits: BTreeMap<String, Arc<Circuit>> = BTreeMap::new();
        for name in &order {
            let def = defs[name.as_str()];
            let circuit = build_circuit(def, &circuits, ctx)?;
            circuits.insert(name.clone(), circuit);
        }
        info!(circuits = order.len(), main = %main, "project loaded");

        Ok(Self { circuits, order, main })
    }

    pub fn circuit(&self, name: &str) -> Option<&Arc<Circuit>> {
        self.circuits.get(name)
    }

    pub fn main_circuit(&self) -> &Arc<Circuit> {
        &self.circuits[&self.main]
    }

    /// All circuits, children before the circuits that use them.
    pub fn circuits(&self) -> impl Iterator<Item = &Arc<Circuit>> {
        self.order.iter().filter_map(|n| self.circuits.get(n))
    }
}

/// Child circuit named by a SUB line.
fn child_name(def: &ComponentDef) -> Result<&str> {
    def.words
        .first()
        .map(String::as_str)
        .ok_or_else(|| def.invalid("missing child circuit name"))
}

/// Depth-first topological order over subcircuit references.
fn build_order(ast: &NetlistAst, defs: &HashMap<&str, &CircuitDef>) -> Result<Vec<String>> {
    fn visit(
        name: &str,
        defs: &HashMap<&str, &CircuitDef>,
        active: &mut HashSet<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if !active.insert(name.to_string()) {
            return Err(GatesimError::RecursiveCircuit { name: name.to_string() });
        }
        let def = defs
            .get(name)
            .ok_or_else(|| GatesimError::UnknownCircuit { name: name.to_string() })?;
        for comp in def.components.iter().filter(|c| c.kind == ComponentKind::Subcircuit) {
            visit(child_name(comp)?, defs, active, done, order)?;
        }
        active.remove(name);
        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    let mut active = HashSet::new();
    let mut done = HashSet::new();
    let mut order = Vec::new();
    for def in &ast.circuits {
        visit(&def.name, defs, &mut active, &mut done, &mut order)?;
    }
    Ok(order)
}

fn build_circuit(def: &CircuitDef, built: &BTreeMap<String, Arc<Circuit>>, ctx: &SimContext) -> Result<Arc<Circuit>> {
    let mut components = Vec::new();
    for comp in &def.components {
        components.extend(build_components(comp, built, ctx)?);
    }
    debug!(circuit = %def.name, components = components.len(), "building circuit");

    let circuit = Circuit::new(def.name.clone(), ctx);
    Transaction::new(format!("load {}", def.name))
        .write(&circuit)
        .run(|m| {
            for comp in components {
                m.add(&circuit, comp)?;
            }
            Ok(())
        })?;
    Ok(circuit)
}

fn width_param(def: &ComponentDef, default: i64) -> Result<BitWidth> {
    let bits = def.number("width", default)?;
    if !(1..=BitWidth::MAX_BITS as i64).contains(&bits) {
        return Err(GatesimError::InvalidParameter {
            component: def.display_name(),
            param: "width".to_string(),
            message: format!("width must be between 1 and {}, got {}", BitWidth::MAX_BITS, bits),
        });
    }
    Ok(BitWidth::new(bits as u8))
}

fn gate_kind(kind: ComponentKind) -> Option<GateKind> {
    Some(match kind {
        ComponentKind::And => GateKind::And,
        ComponentKind::Or => GateKind::Or,
        ComponentKind::Xor => GateKind::Xor,
        ComponentKind::Nand => GateKind::Nand,
        ComponentKind::Nor => GateKind::Nor,
        ComponentKind::Xnor => GateKind::Xnor,
        ComponentKind::Not => GateKind::Not,
        ComponentKind::Buf => GateKind::Buf,
        _ => return None,
    })
}

/// Components for one DSL line. A polyline yields one wire per segment.
fn build_components(
    def: &ComponentDef,
    built: &BTreeMap<String, Arc<Circuit>>,
    ctx: &SimContext,
) -> Result<Vec<Component>> {
    let locs: Vec<Location> = def.locations.iter().map(|&p| Location::from(p)).collect();
    let at = locs.first().copied().unwrap_or(Location::new(0, 0));
    let single = |comp: Component| -> Result<Vec<Component>> { Ok(vec![comp]) };

    match def.kind {
        ComponentKind::Wire => locs
            .windows(2)
            .filter(|pair| pair[0] != pair[1])
            .map(|pair| {
                Wire::new(pair[0], pair[1])
                    .map(Component::Wire)
                    .map_err(|e| def.invalid(e.to_string()))
            })
            .collect(),
        ComponentKind::Pin => {
            let width = width_param(def, 1)?;
            let label = def.text("label").or_else(|| def.name.clone());
            let id = ctx.next_component_id();
            match def.words.first().map(|w| w.to_ascii_lowercase()).as_deref() {
                None | Some("in") | Some("input") => single(Component::Pin(Pin::input(id, at, width, label))),
                Some("out") | Some("output") => single(Component::Pin(Pin::output(id, at, width, label))),
                Some(other) => Err(def.invalid(format!("pin direction must be 'in' or 'out', got '{}'", other))),
            }
        }
        ComponentKind::Splitter => {
            let fanout = locs.len() - 1;
            let width = width_param(def, fanout as i64)?;
            let mapping = match def.text("map") {
                Some(text) => Some(parse_mapping(&text).ok_or_else(|| GatesimError::InvalidParameter {
                    component: def.display_name(),
                    param: "map".to_string(),
                    message: format!("expected comma-separated end numbers, got '{}'", text),
                })?),
                None => None,
            };
            let width_bits = width.bits() as u8;
            if let Some(m) = &mapping {
                if m.len() != width.bits() {
                    return Err(def.invalid(format!("map covers {} bits but width is {}", m.len(), width_bits)));
                }
            }
            let splitter = Splitter::new(ctx.next_component_id(), at, locs[1..].to_vec(), width_bits, mapping)
                .map_err(|e| def.invalid(e.to_string()))?;
            single(Component::Splitter(splitter))
        }
        ComponentKind::Tunnel => {
            let label = def
                .words
                .first()
                .cloned()
                .or_else(|| def.text("label"))
                .ok_or_else(|| def.invalid("tunnel needs a label"))?;
            single(Component::Tunnel(Tunnel {
                id: ctx.next_component_id(),
                loc: at,
                label,
                width: width_param(def, 1)?,
            }))
        }
        ComponentKind::Pull => {
            let pull = match def.words.first().map(String::as_str) {
                None | Some("0") => Value::FALSE,
                Some("1") => Value::TRUE,
                Some("E") | Some("e") => Value::ERROR,
                Some(other) => return Err(def.invalid(format!("pull must be 0, 1 or E, got '{}'", other))),
            };
            single(Component::PullResistor(PullResistor {
                id: ctx.next_component_id(),
                loc: at,
                pull,
            }))
        }
        ComponentKind::Constant => {
            let width = width_param(def, 1)?;
            let raw = def.words.first().map(String::as_str).unwrap_or("0");
            let value: u64 = raw
                .parse::<i64>()
                .map(|v| v as u64)
                .map_err(|_| def.invalid(format!("invalid constant value '{}'", raw)))?;
            single(Component::Constant(Constant {
                id: ctx.next_component_id(),
                loc: at,
                value: Value::known(width, value),
            }))
        }
        ComponentKind::Clock => {
            let phase = |key: &str| -> Result<u32> {
                let n = def.number(key, 1)?;
                u32::try_from(n).ok().filter(|&n| n > 0).ok_or_else(|| GatesimError::InvalidParameter {
                    component: def.display_name(),
                    param: key.to_string(),
                    message: format!("expected a positive number of half cycles, got {}", n),
                })
            };
            single(Component::Clock(Clock {
                id: ctx.next_component_id(),
                loc: at,
                high: phase("high")?,
                low: phase("low")?,
            }))
        }
        ComponentKind::Subcircuit => {
            let name = child_name(def)?;
            let child = built
                .get(name)
                .ok_or_else(|| GatesimError::UnknownCircuit { name: name.to_string() })?;
            let sub = SubcircuitInstance::new(ctx.next_component_id(), Arc::clone(child), locs)
                .map_err(|e| def.invalid(e.to_string()))?;
            single(Component::Subcircuit(sub))
        }
        kind => {
            let gate_kind = gate_kind(kind).ok_or_else(|| def.invalid("not a gate"))?;
            let gate = Gate::new(
                ctx.next_component_id(),
                gate_kind,
                width_param(def, 1)?,
                at,
                locs[1..].to_vec(),
            )
            .map_err(|e| def.invalid(e.to_string()))?;
            single(Component::Gate(gate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    const HALF_ADDER: &str = "\
PIN a (0,0) in
PIN b (0,20) in
XOR (60,0) (40,0) (40,20)
AND (60,40) (40,40) (40,60)
W (0,0) (40,0)
W (20,0) (20,40) (40,40)
W (0,20) (10,20) (40,20)
W (10,20) (10,60) (40,60)
W (60,0) (80,0)
W (60,40) (80,40)
PIN sum (80,0) out
PIN carry (80,40) out
";

    #[test]
    fn test_build_half_adder() {
        let ctx = SimContext::new().unwrap();
        let project = Project::from_ast(&parse(HALF_ADDER).unwrap(), &ctx).unwrap();
        let main = project.main_circuit();
        assert_eq!(main.name(), "main");
        assert_eq!(main.non_wires().len(), 6);
        // the tap at (20,0) splits the first wire
        assert!(main.wires().contains(&Wire::new((0, 0).into(), (20, 0).into()).unwrap()));
        assert!(main.wires().contains(&Wire::new((20, 0).into(), (40, 0).into()).unwrap()));
        let labels: Vec<_> = main.port_pins().into_iter().filter_map(|p| p.label).collect();
        assert_eq!(labels, vec!["a", "b", "sum", "carry"]);
    }

    #[test]
    fn test_children_built_first() {
        let src = "\
.circuit top
PIN i (80,0) in
SUB u1 (100,0) (140,0) inv
PIN o (160,0) out
W (80,0) (100,0)
W (140,0) (160,0)
.circuit inv
PIN a (0,0) in
NOT (30,0) (10,0)
PIN y (50,0) out
W (0,0) (10,0)
W (30,0) (50,0)
";
        let ctx = SimContext::new().unwrap();
        let project = Project::from_ast(&parse(src).unwrap(), &ctx).unwrap();
        let names: Vec<_> = project.circuits().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["inv", "top"]);
        assert_eq!(project.main_circuit().name(), "top");
        assert!(project.circuit("inv").is_some());
    }

    #[test]
    fn test_rejects_bad_hierarchies() {
        let ctx = SimContext::inline();
        let err = |src: &str| Project::from_ast(&parse(src).unwrap(), &ctx).unwrap_err();

        assert!(matches!(
            err(".circuit a\nSUB u (0,0) b\n"),
            GatesimError::UnknownCircuit { .. }
        ));
        assert!(matches!(
            err(".circuit a\nPIN p (0,0) in\nSUB u (0,0) b\n.circuit b\nPIN p (0,0) in\nSUB u (0,0) a\n"),
            GatesimError::RecursiveCircuit { .. }
        ));
        assert!(matches!(
            err(".circuit a\nPIN p (0,0)\n.circuit a\nPIN q (0,0)\n"),
            GatesimError::DuplicateCircuit { .. }
        ));
        assert!(matches!(
            err(".circuit a\nPIN p (0,0)\n.main b\n"),
            GatesimError::UnknownCircuit { .. }
        ));
    }

    #[test]
    fn test_rejects_bad_components() {
        let ctx = SimContext::inline();
        let err = |src: &str| Project::from_ast(&parse(src).unwrap(), &ctx).unwrap_err();

        assert!(matches!(err("W (0,0) (10,10)"), GatesimError::InvalidComponent { line: 1, .. }));
        assert!(matches!(err("PIN p (0,0) sideways"), GatesimError::InvalidComponent { .. }));
        assert!(matches!(err("PIN p (0,0) width=65"), GatesimError::InvalidParameter { .. }));
        assert!(matches!(err("NOT (10,0) (0,0) (0,10)"), GatesimError::InvalidComponent { .. }));
        assert!(matches!(
            err("SPLIT (0,0) (10,0) (10,10) width=4 map=\"1,2\""),
            GatesimError::InvalidComponent { .. }
        ));
        assert!(matches!(err("CLOCK (0,0) high=0"), GatesimError::InvalidParameter { .. }));
    }

    #[test]
    fn test_context_counters_are_shared() {
        let ctx = SimContext::inline();
        let other = ctx.clone();
        let a = ctx.next_component_id();
        let b = other.next_component_id();
        assert_ne!(a, b);
        assert!(ctx.next_serial() < other.next_serial());
    }
}
