//! Network snapshot acted upon by remedial actions.
//!
//! The network is an undirected petgraph multigraph whose nodes are buses and
//! injections and whose edges are the switchable branches (lines, switches,
//! phase-shifting transformers, HVDC links). It only carries the state that
//! remedial actions and contingencies can change: open/closed status, PST
//! taps and injection/HVDC setpoints. Flows are computed elsewhere.
//!
//! Cloning a network yields a fully independent snapshot; the search tree
//! relies on this to evaluate candidate topologies side by side.

use crate::action::{ElementaryAction, NetworkAction, RangeAction, RangeActionKind};
use crate::error::{RaoError, RaoResult};
use crate::state::Contingency;
use crate::{Country, ElementId};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: ElementId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: Option<Country>,
}

impl Bus {
    pub fn new(id: impl Into<String>, country: Option<&str>) -> Self {
        let id = ElementId::new(id);
        Self {
            name: id.to_string(),
            id,
            country: country.map(Country::new),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Injection {
    pub id: ElementId,
    pub bus: ElementId,
    #[serde(default)]
    pub setpoint: f64,
    #[serde(default = "default_true")]
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: ElementId,
    pub from_bus: ElementId,
    pub to_bus: ElementId,
    #[serde(default = "default_true")]
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub id: ElementId,
    pub from_bus: ElementId,
    pub to_bus: ElementId,
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pst {
    pub id: ElementId,
    pub from_bus: ElementId,
    pub to_bus: ElementId,
    #[serde(default)]
    pub tap: i32,
    pub low_tap: i32,
    pub high_tap: i32,
    #[serde(default = "default_true")]
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HvdcLine {
    pub id: ElementId,
    pub from_bus: ElementId,
    pub to_bus: ElementId,
    #[serde(default)]
    pub setpoint: f64,
    #[serde(default = "default_true")]
    pub connected: bool,
}

/// Graph node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Bus(Bus),
    Injection(Injection),
}

/// Graph edge: a switchable branch between two buses.
#[derive(Debug, Clone, PartialEq)]
pub enum Edge {
    Line(Line),
    Switch(Switch),
    Pst(Pst),
    Hvdc(HvdcLine),
}

impl Edge {
    pub fn id(&self) -> &ElementId {
        match self {
            Edge::Line(l) => &l.id,
            Edge::Switch(s) => &s.id,
            Edge::Pst(p) => &p.id,
            Edge::Hvdc(h) => &h.id,
        }
    }

    fn endpoints(&self) -> (&ElementId, &ElementId) {
        match self {
            Edge::Line(l) => (&l.from_bus, &l.to_bus),
            Edge::Switch(s) => (&s.from_bus, &s.to_bus),
            Edge::Pst(p) => (&p.from_bus, &p.to_bus),
            Edge::Hvdc(h) => (&h.from_bus, &h.to_bus),
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            Edge::Line(l) => !l.connected,
            Edge::Switch(s) => s.open,
            Edge::Pst(p) => !p.connected,
            Edge::Hvdc(h) => !h.connected,
        }
    }

    fn set_open(&mut self, open: bool) {
        match self {
            Edge::Line(l) => l.connected = !open,
            Edge::Switch(s) => s.open = open,
            Edge::Pst(p) => p.connected = !open,
            Edge::Hvdc(h) => h.connected = !open,
        }
    }
}

/// Flat description of a network, the serialized form of [`Network`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkData {
    #[serde(default)]
    pub buses: Vec<Bus>,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub switches: Vec<Switch>,
    #[serde(default)]
    pub psts: Vec<Pst>,
    #[serde(default)]
    pub hvdc_lines: Vec<HvdcLine>,
    #[serde(default)]
    pub injections: Vec<Injection>,
}

/// Element counts, for summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_lines: usize,
    pub num_switches: usize,
    pub num_psts: usize,
    pub num_hvdc_lines: usize,
    pub num_injections: usize,
}

/// Mutable snapshot of the grid topology and setpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "NetworkData", into = "NetworkData")]
pub struct Network {
    graph: UnGraph<Node, Edge>,
    buses: HashMap<ElementId, NodeIndex>,
    injections: HashMap<ElementId, NodeIndex>,
    edges: HashMap<ElementId, EdgeIndex>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &UnGraph<Node, Edge> {
        &self.graph
    }

    fn ensure_unique(&self, id: &ElementId) -> RaoResult<()> {
        if self.contains_element(id) {
            return Err(RaoError::Network(format!("duplicate network element '{id}'")));
        }
        Ok(())
    }

    fn bus_index(&self, id: &ElementId) -> RaoResult<NodeIndex> {
        self.buses
            .get(id)
            .copied()
            .ok_or_else(|| RaoError::Network(format!("unknown bus '{id}'")))
    }

    pub fn add_bus(&mut self, bus: Bus) -> RaoResult<NodeIndex> {
        self.ensure_unique(&bus.id)?;
        let id = bus.id.clone();
        let idx = self.graph.add_node(Node::Bus(bus));
        self.buses.insert(id, idx);
        Ok(idx)
    }

    pub fn add_injection(&mut self, injection: Injection) -> RaoResult<NodeIndex> {
        self.ensure_unique(&injection.id)?;
        self.bus_index(&injection.bus)?;
        let id = injection.id.clone();
        let idx = self.graph.add_node(Node::Injection(injection));
        self.injections.insert(id, idx);
        Ok(idx)
    }

    pub fn add_edge(&mut self, edge: Edge) -> RaoResult<EdgeIndex> {
        self.ensure_unique(edge.id())?;
        let (from, to) = edge.endpoints();
        let from = self.bus_index(from)?;
        let to = self.bus_index(to)?;
        let id = edge.id().clone();
        let idx = self.graph.add_edge(from, to, edge);
        self.edges.insert(id, idx);
        Ok(idx)
    }

    pub fn contains_element(&self, id: &ElementId) -> bool {
        self.buses.contains_key(id) || self.injections.contains_key(id) || self.edges.contains_key(id)
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            num_buses: self.buses.len(),
            num_injections: self.injections.len(),
            ..NetworkStats::default()
        };
        for edge in self.graph.edge_weights() {
            match edge {
                Edge::Line(_) => stats.num_lines += 1,
                Edge::Switch(_) => stats.num_switches += 1,
                Edge::Pst(_) => stats.num_psts += 1,
                Edge::Hvdc(_) => stats.num_hvdc_lines += 1,
            }
        }
        stats
    }

    fn edge(&self, id: &ElementId) -> RaoResult<&Edge> {
        self.edges
            .get(id)
            .and_then(|idx| self.graph.edge_weight(*idx))
            .ok_or_else(|| RaoError::Network(format!("unknown switchable element '{id}'")))
    }

    fn edge_mut(&mut self, id: &ElementId) -> RaoResult<&mut Edge> {
        let idx = *self
            .edges
            .get(id)
            .ok_or_else(|| RaoError::Network(format!("unknown switchable element '{id}'")))?;
        self.graph
            .edge_weight_mut(idx)
            .ok_or_else(|| RaoError::Network(format!("dangling edge index for '{id}'")))
    }

    fn injection_mut(&mut self, id: &ElementId) -> Option<&mut Injection> {
        let idx = *self.injections.get(id)?;
        match self.graph.node_weight_mut(idx) {
            Some(Node::Injection(inj)) => Some(inj),
            _ => None,
        }
    }

    fn injection(&self, id: &ElementId) -> Option<&Injection> {
        let idx = *self.injections.get(id)?;
        match self.graph.node_weight(idx) {
            Some(Node::Injection(inj)) => Some(inj),
            _ => None,
        }
    }

    /// Open status of any switchable branch.
    pub fn is_open(&self, id: &ElementId) -> RaoResult<bool> {
        self.edge(id).map(Edge::is_open)
    }

    /// Open status of a switch; other branch kinds are rejected.
    pub fn is_switch_open(&self, id: &ElementId) -> RaoResult<bool> {
        match self.edge(id)? {
            Edge::Switch(s) => Ok(s.open),
            _ => Err(RaoError::Network(format!("'{id}' is not a switch"))),
        }
    }

    pub fn set_open(&mut self, id: &ElementId, open: bool) -> RaoResult<()> {
        self.edge_mut(id)?.set_open(open);
        Ok(())
    }

    pub fn pst_tap(&self, id: &ElementId) -> RaoResult<i32> {
        match self.edge(id)? {
            Edge::Pst(p) => Ok(p.tap),
            _ => Err(RaoError::Network(format!("'{id}' is not a phase shifter"))),
        }
    }

    pub fn pst_tap_range(&self, id: &ElementId) -> RaoResult<(i32, i32)> {
        match self.edge(id)? {
            Edge::Pst(p) => Ok((p.low_tap, p.high_tap)),
            _ => Err(RaoError::Network(format!("'{id}' is not a phase shifter"))),
        }
    }

    pub fn set_pst_tap(&mut self, id: &ElementId, tap: i32) -> RaoResult<()> {
        match self.edge_mut(id)? {
            Edge::Pst(p) => {
                if tap < p.low_tap || tap > p.high_tap {
                    return Err(RaoError::Network(format!(
                        "tap {tap} outside of [{}, {}] for '{id}'",
                        p.low_tap, p.high_tap
                    )));
                }
                p.tap = tap;
                Ok(())
            }
            _ => Err(RaoError::Network(format!("'{id}' is not a phase shifter"))),
        }
    }

    /// Setpoint of an injection or HVDC link.
    pub fn setpoint(&self, id: &ElementId) -> RaoResult<f64> {
        if let Some(inj) = self.injection(id) {
            return Ok(inj.setpoint);
        }
        match self.edge(id) {
            Ok(Edge::Hvdc(h)) => Ok(h.setpoint),
            _ => Err(RaoError::Network(format!(
                "'{id}' is neither an injection nor an HVDC line"
            ))),
        }
    }

    pub fn set_setpoint(&mut self, id: &ElementId, setpoint: f64) -> RaoResult<()> {
        if let Some(inj) = self.injection_mut(id) {
            inj.setpoint = setpoint;
            return Ok(());
        }
        match self.edge_mut(id) {
            Ok(Edge::Hvdc(h)) => {
                h.setpoint = setpoint;
                Ok(())
            }
            _ => Err(RaoError::Network(format!(
                "'{id}' is neither an injection nor an HVDC line"
            ))),
        }
    }

    pub fn apply_elementary_action(&mut self, action: &ElementaryAction) -> RaoResult<()> {
        match action {
            ElementaryAction::Topological {
                element,
                action_type,
            } => self.set_open(element, action_type.is_open()),
            ElementaryAction::PstSetpoint { element, tap } => self.set_pst_tap(element, *tap),
            ElementaryAction::InjectionSetpoint { element, setpoint } => {
                self.set_setpoint(element, *setpoint)
            }
            ElementaryAction::SwitchPair {
                switch_to_open,
                switch_to_close,
            } => {
                self.is_switch_open(switch_to_open)?;
                self.is_switch_open(switch_to_close)?;
                self.set_open(switch_to_open, true)?;
                self.set_open(switch_to_close, false)
            }
        }
    }

    pub fn apply_network_action(&mut self, action: &NetworkAction) -> RaoResult<()> {
        for elementary in &action.elementary_actions {
            self.apply_elementary_action(elementary).map_err(|e| {
                RaoError::Network(format!("applying network action '{}': {e}", action.id))
            })?;
        }
        Ok(())
    }

    /// Disconnect every element tripped by the contingency.
    pub fn apply_contingency(&mut self, contingency: &Contingency) -> RaoResult<()> {
        for element in &contingency.elements {
            if let Some(inj) = self.injection_mut(element) {
                inj.connected = false;
                continue;
            }
            self.set_open(element, true).map_err(|_| {
                RaoError::Network(format!(
                    "contingency '{}' trips unknown element '{element}'",
                    contingency.id
                ))
            })?;
        }
        Ok(())
    }

    /// Current setpoint of a range action (tap position for PSTs).
    pub fn range_action_setpoint(&self, action: &RangeAction) -> RaoResult<f64> {
        match action.kind {
            RangeActionKind::PstTap => self.pst_tap(&action.element).map(f64::from),
            RangeActionKind::Hvdc | RangeActionKind::Injection => self.setpoint(&action.element),
        }
    }

    /// Set a range action; PST setpoints are rounded to the nearest tap.
    pub fn apply_range_action(&mut self, action: &RangeAction, setpoint: f64) -> RaoResult<()> {
        match action.kind {
            RangeActionKind::PstTap => self.set_pst_tap(&action.element, setpoint.round() as i32),
            RangeActionKind::Hvdc | RangeActionKind::Injection => {
                self.set_setpoint(&action.element, setpoint)
            }
        }
    }

    fn bus_country(&self, id: &ElementId) -> Option<Country> {
        let idx = self.buses.get(id)?;
        match self.graph.node_weight(*idx) {
            Some(Node::Bus(bus)) => bus.country.clone(),
            _ => None,
        }
    }

    /// Countries an element belongs to; `None` when unknown.
    ///
    /// Branches report the countries of both ends.
    pub fn element_countries(&self, id: &ElementId) -> BTreeSet<Option<Country>> {
        if self.buses.contains_key(id) {
            return BTreeSet::from([self.bus_country(id)]);
        }
        if let Some(inj) = self.injection(id) {
            return BTreeSet::from([self.bus_country(&inj.bus)]);
        }
        match self.edge(id) {
            Ok(edge) => {
                let (from, to) = edge.endpoints();
                BTreeSet::from([self.bus_country(from), self.bus_country(to)])
            }
            Err(_) => BTreeSet::from([None]),
        }
    }

    /// Country adjacency: two countries are neighbours when a branch links them.
    pub fn country_graph(&self) -> CountryGraph {
        let mut graph = CountryGraph::default();
        for edge in self.graph.edge_weights() {
            let (from, to) = edge.endpoints();
            if let (Some(a), Some(b)) = (self.bus_country(from), self.bus_country(to)) {
                graph.add_border(a, b);
            }
        }
        graph
    }

    pub fn to_data(&self) -> NetworkData {
        let mut data = NetworkData::default();
        for node in self.graph.node_weights() {
            match node {
                Node::Bus(bus) => data.buses.push(bus.clone()),
                Node::Injection(inj) => data.injections.push(inj.clone()),
            }
        }
        for edge in self.graph.edge_weights() {
            match edge {
                Edge::Line(l) => data.lines.push(l.clone()),
                Edge::Switch(s) => data.switches.push(s.clone()),
                Edge::Pst(p) => data.psts.push(p.clone()),
                Edge::Hvdc(h) => data.hvdc_lines.push(h.clone()),
            }
        }
        data
    }
}

impl TryFrom<NetworkData> for Network {
    type Error = RaoError;

    fn try_from(data: NetworkData) -> Result<Self, Self::Error> {
        let mut network = Network::new();
        for bus in data.buses {
            network.add_bus(bus)?;
        }
        for inj in data.injections {
            network.add_injection(inj)?;
        }
        for line in data.lines {
            network.add_edge(Edge::Line(line))?;
        }
        for switch in data.switches {
            network.add_edge(Edge::Switch(switch))?;
        }
        for pst in data.psts {
            if pst.low_tap > pst.high_tap || pst.tap < pst.low_tap || pst.tap > pst.high_tap {
                return Err(RaoError::Network(format!(
                    "phase shifter '{}' has inconsistent taps",
                    pst.id
                )));
            }
            network.add_edge(Edge::Pst(pst))?;
        }
        for hvdc in data.hvdc_lines {
            network.add_edge(Edge::Hvdc(hvdc))?;
        }
        Ok(network)
    }
}

impl From<Network> for NetworkData {
    fn from(network: Network) -> Self {
        network.to_data()
    }
}

/// Undirected adjacency between countries sharing a border.
#[derive(Debug, Clone, Default)]
pub struct CountryGraph {
    borders: BTreeMap<Country, BTreeSet<Country>>,
}

impl CountryGraph {
    pub fn add_border(&mut self, a: Country, b: Country) {
        if a == b {
            return;
        }
        self.borders.entry(a.clone()).or_default().insert(b.clone());
        self.borders.entry(b).or_default().insert(a);
    }

    /// Whether `b` can be reached from `a` crossing at most `max_boundaries` borders.
    pub fn are_neighbors(&self, a: &Country, b: &Country, max_boundaries: usize) -> bool {
        if a == b {
            return true;
        }
        let mut visited = BTreeSet::from([a]);
        let mut queue = VecDeque::from([(a, 0usize)]);
        while let Some((country, depth)) = queue.pop_front() {
            if depth >= max_boundaries {
                continue;
            }
            let Some(next) = self.borders.get(country) else {
                continue;
            };
            for neighbour in next {
                if neighbour == b {
                    return true;
                }
                if visited.insert(neighbour) {
                    queue.push_back((neighbour, depth + 1));
                }
            }
        }
        false
    }
}
