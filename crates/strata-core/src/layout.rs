use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::shape::Shape;
use crate::tensor::Tensor;

// Layout — Flat memory layout of a compiled graph
//
// Compiled kernels never look anything up by name or identity. Everything
// they touch is a slice of one of a handful of flat regions, at an offset
// decided here, once, when the graph is compiled:
//
//   input      one slot per source node, packed in schedule order
//   target     one slot per output node, packed by ascending node id
//   data       three parallel banks with identical offsets per node:
//                value (post-activation), z (pre-activation), error (delta)
//              plus a scratch vector as wide as the widest node
//   state      edge weights and node biases, placed by a ParamPlacement
//   gradient   one accumulator element per parameter element
//   optimizer  aux_per_param x the parameter count
//
// PARAMETERS:
//
//   Every weight matrix and bias vector gets a ParamSlot:
//     buffer, offset — where the live values are (state region)
//     flat           — where it sits in the flattened parameter vector;
//                      gradient and optimizer regions are indexed by this
//
//   Parameters are numbered edges first (by edge id), then biases (by node
//   id). The flat offsets are therefore the same whichever placement is used.
//
// OWNERSHIP:
//
//   CopyPlacement       values are copied into one engine-owned buffer;
//                       `sync_to_host` writes them back.
//   ReferencePlacement  each host tensor's own storage is a buffer; kernels
//                       read and write the host data in place.
//
//   A compiled graph uses exactly one of the two.

/// How compiled kernels hold edge weights and node biases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightOwnership {
    /// Copy parameters into a private buffer (value semantics).
    #[default]
    Copy,
    /// Address the host tensors' storage directly (reference semantics).
    Reference,
}

/// Location of one parameter tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSlot {
    /// Index of the state buffer holding the values.
    pub buffer: usize,
    /// Offset of the first element inside that buffer.
    pub offset: usize,
    /// Offset inside the flattened parameter vector (gradient/optimizer).
    pub flat: usize,
    /// Number of elements.
    pub len: usize,
}

/// What a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOwner {
    Weight(EdgeId),
    Bias(NodeId),
}

/// Per-node offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSlot {
    pub id: NodeId,
    pub width: usize,
    /// Offset in each data bank (value, z, error).
    pub data: usize,
    /// Offset in the input region (source nodes only).
    pub input: Option<usize>,
    /// Offset in the target region (output nodes only).
    pub target: Option<usize>,
    pub bias: Option<ParamSlot>,
}

/// Per-edge offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSlot {
    pub id: EdgeId,
    pub src: NodeId,
    pub dst: NodeId,
    /// Weight matrix rows (source width).
    pub rows: usize,
    /// Weight matrix columns (destination width).
    pub cols: usize,
    /// Position among the destination's afferents.
    pub position: usize,
    pub weight: ParamSlot,
}

/// The compiled offset maps for one graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    nodes: Vec<NodeSlot>,
    edges: Vec<EdgeSlot>,
    afferents: Vec<Vec<EdgeId>>,
    efferents: Vec<Vec<EdgeId>>,
    params: Vec<(ParamOwner, ParamSlot)>,
    ownership: WeightOwnership,
    input_len: usize,
    target_len: usize,
    data_len: usize,
    scratch_len: usize,
    param_len: usize,
    optimizer_len: usize,
}

impl MemoryLayout {
    pub fn node(&self, id: NodeId) -> &NodeSlot {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &EdgeSlot {
        &self.edges[id.0]
    }

    pub fn nodes(&self) -> &[NodeSlot] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeSlot] {
        &self.edges
    }

    /// Incoming edges of `node`, indexed by position.
    pub fn afferents(&self, node: NodeId) -> &[EdgeId] {
        &self.afferents[node.0]
    }

    pub fn efferents(&self, node: NodeId) -> &[EdgeId] {
        &self.efferents[node.0]
    }

    /// All parameters in flat order.
    pub fn params(&self) -> &[(ParamOwner, ParamSlot)] {
        &self.params
    }

    pub fn param_slots(&self) -> impl Iterator<Item = &ParamSlot> {
        self.params.iter().map(|(_, slot)| slot)
    }

    pub fn ownership(&self) -> WeightOwnership {
        self.ownership
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// Length of each data bank.
    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub fn scratch_len(&self) -> usize {
        self.scratch_len
    }

    /// Total parameter elements (= gradient region length).
    pub fn param_len(&self) -> usize {
        self.param_len
    }

    pub fn optimizer_len(&self) -> usize {
        self.optimizer_len
    }
}

// ParamStore — the state region

/// Mutable view of every state buffer, valid while the store is locked.
pub struct ParamsMut<'a> {
    buffers: Vec<&'a mut [f64]>,
}

impl<'a> ParamsMut<'a> {
    pub fn get(&self, slot: &ParamSlot) -> &[f64] {
        &self.buffers[slot.buffer][slot.offset..slot.offset + slot.len]
    }

    pub fn get_mut(&mut self, slot: &ParamSlot) -> &mut [f64] {
        &mut self.buffers[slot.buffer][slot.offset..slot.offset + slot.len]
    }
}

/// Read-only view of every state buffer.
pub struct ParamsRef<'a> {
    buffers: Vec<&'a [f64]>,
}

impl<'a> ParamsRef<'a> {
    pub fn get(&self, slot: &ParamSlot) -> &[f64] {
        &self.buffers[slot.buffer][slot.offset..slot.offset + slot.len]
    }
}

/// Read access to live parameter values, whichever way the store is locked.
pub trait ParamView {
    fn param(&self, slot: &ParamSlot) -> &[f64];
}

impl ParamView for ParamsRef<'_> {
    fn param(&self, slot: &ParamSlot) -> &[f64] {
        self.get(slot)
    }
}

impl ParamView for ParamsMut<'_> {
    fn param(&self, slot: &ParamSlot) -> &[f64] {
        self.get(slot)
    }
}

#[derive(Debug)]
enum StoreKind {
    Owned {
        buffer: Vec<f64>,
        /// Host tensor and the offset its values were copied to.
        host: Vec<(Tensor, usize)>,
    },
    Shared {
        buffers: Vec<Tensor>,
    },
}

/// The state region: live parameter values, owned or shared with the host.
#[derive(Debug)]
pub struct ParamStore {
    kind: StoreKind,
}

impl ParamStore {
    pub fn ownership(&self) -> WeightOwnership {
        match self.kind {
            StoreKind::Owned { .. } => WeightOwnership::Copy,
            StoreKind::Shared { .. } => WeightOwnership::Reference,
        }
    }

    /// Lock every buffer for writing and run `f` on the view.
    pub fn with_mut<R>(&mut self, f: impl FnOnce(&mut ParamsMut<'_>) -> R) -> Result<R> {
        match &mut self.kind {
            StoreKind::Owned { buffer, .. } => {
                let mut view = ParamsMut {
                    buffers: vec![buffer.as_mut_slice()],
                };
                Ok(f(&mut view))
            }
            StoreKind::Shared { buffers } => {
                let mut guards = buffers
                    .iter()
                    .map(|t| t.write())
                    .collect::<Result<Vec<_>>>()?;
                let mut view = ParamsMut {
                    buffers: guards.iter_mut().map(|g| &mut **g).collect(),
                };
                Ok(f(&mut view))
            }
        }
    }

    /// Lock every buffer for reading and run `f` on the view.
    pub fn with_ref<R>(&self, f: impl FnOnce(&ParamsRef<'_>) -> R) -> Result<R> {
        match &self.kind {
            StoreKind::Owned { buffer, .. } => {
                let view = ParamsRef {
                    buffers: vec![buffer.as_slice()],
                };
                Ok(f(&view))
            }
            StoreKind::Shared { buffers } => {
                let guards = buffers
                    .iter()
                    .map(|t| t.read())
                    .collect::<Result<Vec<_>>>()?;
                let view = ParamsRef {
                    buffers: guards.iter().map(|g| g.as_slice()).collect(),
                };
                Ok(f(&view))
            }
        }
    }

    /// Copy one parameter's current values out.
    pub fn read(&self, slot: &ParamSlot) -> Result<Vec<f64>> {
        self.with_ref(|p| p.get(slot).to_vec())
    }

    /// Write compiled values back into the host tensors. A no-op under
    /// reference ownership, where the host storage is already current.
    pub fn sync_to_host(&self) -> Result<()> {
        if let StoreKind::Owned { buffer, host } = &self.kind {
            for (tensor, offset) in host {
                tensor.assign(&buffer[*offset..*offset + tensor.elem_count()])?;
            }
        }
        Ok(())
    }

    /// Re-copy the host tensors into the private buffer, picking up edits the
    /// host made since compilation. A no-op under reference ownership.
    pub fn reload_from_host(&mut self) -> Result<()> {
        if let StoreKind::Owned { buffer, host } = &mut self.kind {
            for (tensor, offset) in host.iter() {
                let data = tensor.read()?;
                buffer[*offset..*offset + data.len()].copy_from_slice(&data);
            }
        }
        Ok(())
    }
}

// ParamPlacement — the two ownership strategies

/// Decides where each parameter tensor lives in the state region.
pub trait ParamPlacement {
    fn ownership(&self) -> WeightOwnership;

    /// Place `params` (in flat order) and build the store holding them.
    /// Returns `(buffer, offset)` for each parameter.
    fn place(&self, params: &[&Tensor]) -> Result<(Vec<(usize, usize)>, ParamStore)>;
}

/// Value semantics: pack copies of all parameters into one buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyPlacement;

impl ParamPlacement for CopyPlacement {
    fn ownership(&self) -> WeightOwnership {
        WeightOwnership::Copy
    }

    fn place(&self, params: &[&Tensor]) -> Result<(Vec<(usize, usize)>, ParamStore)> {
        // Write-back would otherwise keep only the last parameter's values.
        check_distinct_storage(params)?;
        let total: usize = params.iter().map(|t| t.elem_count()).sum();
        let mut buffer = Vec::with_capacity(total);
        let mut locations = Vec::with_capacity(params.len());
        let mut host = Vec::with_capacity(params.len());
        for tensor in params {
            let offset = buffer.len();
            buffer.extend_from_slice(&tensor.read()?);
            locations.push((0, offset));
            host.push(((*tensor).clone(), offset));
        }
        let store = ParamStore {
            kind: StoreKind::Owned { buffer, host },
        };
        Ok((locations, store))
    }
}

/// Reference semantics: each parameter is its own host-owned buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferencePlacement;

impl ParamPlacement for ReferencePlacement {
    fn ownership(&self) -> WeightOwnership {
        WeightOwnership::Reference
    }

    fn place(&self, params: &[&Tensor]) -> Result<(Vec<(usize, usize)>, ParamStore)> {
        // A buffer locked twice for writing would deadlock the kernel.
        check_distinct_storage(params)?;
        let buffers: Vec<Tensor> = params.iter().map(|t| (*t).clone()).collect();
        let locations = (0..buffers.len()).map(|i| (i, 0)).collect();
        let store = ParamStore {
            kind: StoreKind::Shared { buffers },
        };
        Ok((locations, store))
    }
}

/// Every parameter must be backed by its own host storage.
fn check_distinct_storage(params: &[&Tensor]) -> Result<()> {
    for (i, tensor) in params.iter().enumerate() {
        if let Some(first) = params[..i].iter().position(|p| p.same_storage(tensor)) {
            crate::bail!(
                "the same host tensor backs parameters {} and {}; \
                 each parameter needs its own storage",
                first,
                i
            );
        }
    }
    Ok(())
}

/// The placement strategy for an ownership mode.
pub fn placement_for(ownership: WeightOwnership) -> Box<dyn ParamPlacement> {
    match ownership {
        WeightOwnership::Copy => Box::new(CopyPlacement),
        WeightOwnership::Reference => Box::new(ReferencePlacement),
    }
}

// Compilation

/// Compute the memory layout of `graph` and build its state region.
///
/// `aux_per_param` sizes the optimizer region (0 for inference-only use).
pub fn compile_layout(
    graph: &Graph,
    placement: &dyn ParamPlacement,
    aux_per_param: usize,
) -> Result<(MemoryLayout, ParamStore)> {
    let schedule = graph.schedule()?;

    // 1. Shape checks, reported with the offending entity.
    for edge in graph.edges() {
        let expected = edge.expected_shape(graph);
        if edge.weight.shape() != &expected {
            return Err(Error::EdgeShapeMismatch {
                edge: edge.id,
                expected,
                got: edge.weight.shape().clone(),
            });
        }
    }
    for node in graph.nodes() {
        if let Some(bias) = &node.bias {
            let expected = Shape::from(node.width);
            if graph.is_source(node.id) || bias.shape() != &expected {
                return Err(Error::BiasShapeMismatch {
                    node: node.id,
                    expected: if graph.is_source(node.id) {
                        Shape::from(0)
                    } else {
                        expected
                    },
                    got: bias.shape().clone(),
                });
            }
        }
    }

    // 2. Parameters in flat order: weights by edge id, then biases by node id.
    let mut owners: Vec<ParamOwner> = Vec::new();
    let mut tensors: Vec<&Tensor> = Vec::new();
    for edge in graph.edges() {
        owners.push(ParamOwner::Weight(edge.id));
        tensors.push(&edge.weight);
    }
    for node in graph.nodes() {
        if let Some(bias) = &node.bias {
            owners.push(ParamOwner::Bias(node.id));
            tensors.push(bias);
        }
    }
    let (locations, store) = placement.place(&tensors)?;

    let mut params = Vec::with_capacity(owners.len());
    let mut flat = 0usize;
    for ((owner, tensor), (buffer, offset)) in owners.iter().zip(&tensors).zip(locations) {
        let len = tensor.elem_count();
        params.push((
            *owner,
            ParamSlot {
                buffer,
                offset,
                flat,
                len,
            },
        ));
        flat += len;
    }
    let param_len = flat;

    let bias_slot = |node: NodeId| {
        params.iter().find_map(|(owner, slot)| match owner {
            ParamOwner::Bias(n) if *n == node => Some(*slot),
            _ => None,
        })
    };

    // 3. Node slots in schedule order.
    let mut nodes: Vec<Option<NodeSlot>> = vec![None; graph.num_nodes()];
    let mut data_len = 0usize;
    let mut input_len = 0usize;
    let mut scratch_len = 0usize;
    for id in schedule.node_order() {
        let node = graph.node(id);
        let input = if graph.is_source(id) {
            let offset = input_len;
            input_len += node.width;
            Some(offset)
        } else {
            None
        };
        nodes[id.0] = Some(NodeSlot {
            id,
            width: node.width,
            data: data_len,
            input,
            target: None,
            bias: bias_slot(id),
        });
        data_len += node.width;
        scratch_len = scratch_len.max(node.width);
    }
    let mut nodes: Vec<NodeSlot> = nodes
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or(Error::UnknownNode { node: NodeId(i) }))
        .collect::<Result<_>>()?;

    let mut target_len = 0usize;
    for slot in nodes.iter_mut() {
        if graph.node(slot.id).is_output {
            slot.target = Some(target_len);
            target_len += slot.width;
        }
    }

    // 4. Edge slots with positional afferent numbering.
    let mut edges = Vec::with_capacity(graph.num_edges());
    for edge in graph.edges() {
        let position = graph
            .afferents(edge.dst)
            .iter()
            .position(|&e| e == edge.id)
            .ok_or(Error::DanglingEdge {
                edge: edge.id,
                node: edge.dst,
            })?;
        let (_, weight) = params[edge.id.0];
        edges.push(EdgeSlot {
            id: edge.id,
            src: edge.src,
            dst: edge.dst,
            rows: graph.node(edge.src).width,
            cols: graph.node(edge.dst).width,
            position,
            weight,
        });
    }

    let afferents = (0..graph.num_nodes())
        .map(|i| graph.afferents(NodeId(i)).to_vec())
        .collect();
    let efferents = (0..graph.num_nodes())
        .map(|i| graph.efferents(NodeId(i)).to_vec())
        .collect();

    let layout = MemoryLayout {
        nodes,
        edges,
        afferents,
        efferents,
        params,
        ownership: placement.ownership(),
        input_len,
        target_len,
        data_len,
        scratch_len,
        param_len,
        optimizer_len: aux_per_param * param_len,
    };

    debug!(
        ownership = ?layout.ownership,
        params = layout.param_len,
        data = layout.data_len,
        inputs = layout.input_len,
        targets = layout.target_len,
        "compiled memory layout"
    );

    Ok((layout, store))
}
