//! Graph construction from a linear instruction list.
//!
//! Construction is a single scan with a "current block". Labels open blocks, block
//! enders close them, region markers are consumed and turned into
//! [`ExceptionRegion`]s. Jumps to labels that have not been seen yet are recorded as
//! forward references and wired the moment the label's block appears; whatever is
//! still unresolved after the scan is an [`Error::UndefinedLabel`].

use std::collections::BTreeMap;

use crate::{
    analysis::cfg::{BlockFlags, ControlFlowGraph, EdgeType, ExceptionRegion},
    compiler::{CompilerConfig, EventKind, EventLog},
    ir::{Instr, Label, Scope},
    utils::graph::NodeId,
    Error, Result,
};

/// Builds a [`ControlFlowGraph`] for one scope.
///
/// # Examples
///
/// ```rust
/// use irflow::{
///     analysis::CfgBuilder,
///     compiler::{EventKind, EventLog},
///     ir::{InstrBuilder, Scope},
///     CompilerConfig,
/// };
///
/// let mut scope = Scope::new("answer");
/// let config = CompilerConfig::default();
/// let log = EventLog::new();
///
/// let cfg = CfgBuilder::new(&mut scope, &config)
///     .events(&log)
///     .build(InstrBuilder::new().ret(42i64).build())?;
///
/// assert_eq!(cfg.block_count(), 3);
/// assert!(log.has(EventKind::ScopeBuilt));
/// # Ok::<(), irflow::Error>(())
/// ```
pub struct CfgBuilder<'a> {
    scope: &'a mut Scope,
    config: &'a CompilerConfig,
    events: Option<&'a EventLog>,
    name: Option<String>,
}

impl<'a> CfgBuilder<'a> {
    /// Creates a builder drawing fresh labels from `scope`.
    pub fn new(scope: &'a mut Scope, config: &'a CompilerConfig) -> Self {
        CfgBuilder {
            scope,
            config,
            events: None,
            name: None,
        }
    }

    /// Names the graph differently from the scope (closure bodies are built inside
    /// their host's scope).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Records construction events into `events`.
    #[must_use]
    pub fn events(mut self, events: &'a EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Runs the scan and the configured clean-up.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateLabel`] if a label marker appears twice
    /// - [`Error::UndefinedLabel`] if a jump target, rescue or ensure label has no
    ///   marker
    /// - [`Error::UnbalancedRegion`] if region markers do not pair up
    pub fn build(self, instrs: Vec<Instr>) -> Result<ControlFlowGraph> {
        let local = EventLog::new();
        let events = self.events.unwrap_or(&local);

        let mut cfg = ControlFlowGraph::new(self.scope);
        if let Some(name) = self.name {
            cfg.set_name(name);
        }
        let (entry, exit) = (cfg.entry(), cfg.exit());
        let first = cfg.new_block(self.scope);
        cfg.add_edge(entry, first, EdgeType::FallThrough)?;
        cfg.add_edge(entry, exit, EdgeType::Exit)?;

        let mut scan = Scan {
            cfg,
            scope: self.scope,
            current: Some(first),
            prev: None,
            prev_falls: false,
            forward: BTreeMap::new(),
            open: Vec::new(),
            roots: Vec::new(),
        };
        for instr in instrs {
            scan.step(instr)?;
        }
        let mut cfg = scan.finish()?;
        clean_up(&mut cfg, self.config, events)?;

        events
            .record(EventKind::ScopeBuilt)
            .scope(cfg.name())
            .message(format!(
                "{}: {} blocks, {} edges",
                cfg.name(),
                cfg.block_count(),
                cfg.edge_count()
            ));
        Ok(cfg)
    }
}

impl ControlFlowGraph {
    /// Builds the graph of `scope` from its instruction list.
    ///
    /// Shorthand for [`CfgBuilder::new`] followed by [`CfgBuilder::build`].
    ///
    /// # Errors
    ///
    /// See [`CfgBuilder::build`].
    pub fn build(
        scope: &mut Scope,
        instrs: Vec<Instr>,
        config: &CompilerConfig,
    ) -> Result<ControlFlowGraph> {
        CfgBuilder::new(scope, config).build(instrs)
    }
}

/// State of the linear scan.
struct Scan<'s> {
    cfg: ControlFlowGraph,
    scope: &'s mut Scope,
    /// Open block collecting instructions.
    current: Option<NodeId>,
    /// Last closed block.
    prev: Option<NodeId>,
    /// The last closed block ended in a conditional branch.
    prev_falls: bool,
    /// Label -> blocks jumping to it before it was defined.
    forward: BTreeMap<Label, Vec<NodeId>>,
    /// Open regions, innermost last.
    open: Vec<ExceptionRegion>,
    /// Closed outermost regions.
    roots: Vec<ExceptionRegion>,
}

impl Scan<'_> {
    fn step(&mut self, instr: Instr) -> Result<()> {
        match instr {
            Instr::Label(label) => self.label(label),
            Instr::RegionStart { rescue, ensure } => {
                self.region_start(rescue, ensure);
                Ok(())
            }
            Instr::RegionEnd => self.region_end(),
            instr if instr.ends_basic_block() => self.terminate(instr),
            instr => {
                let block = self.current()?;
                if let Some(block) = self.cfg.block_mut(block) {
                    block.push(instr);
                }
                Ok(())
            }
        }
    }

    fn open_block(&mut self, label: Option<Label>) -> Result<NodeId> {
        let block = match label {
            Some(label) => self.cfg.add_block(label, BlockFlags::SOURCE_LABEL)?,
            None => self.cfg.new_block(self.scope),
        };
        if let Some(current) = self.current.take() {
            self.cfg.add_edge(current, block, EdgeType::FallThrough)?;
        } else if let (true, Some(prev)) = (self.prev_falls, self.prev) {
            self.cfg.add_edge(prev, block, EdgeType::FallThrough)?;
        }
        self.prev_falls = false;
        if let Some(region) = self.open.last_mut() {
            region.add_block(block);
        }
        self.current = Some(block);
        Ok(block)
    }

    fn current(&mut self) -> Result<NodeId> {
        match self.current {
            Some(block) => Ok(block),
            None => self.open_block(None),
        }
    }

    fn is_empty(&self, block: NodeId) -> bool {
        self.cfg.block(block).is_some_and(|b| b.is_empty())
    }

    /// Closes the open block so the next instruction starts a new one it falls into.
    fn close_falling(&mut self) {
        if let Some(block) = self.current.take() {
            self.prev = Some(block);
            self.prev_falls = true;
        }
    }

    fn label(&mut self, label: Label) -> Result<()> {
        if self.cfg.block_for_label(label).is_some() {
            return Err(Error::DuplicateLabel {
                scope: self.cfg.name().to_string(),
                label,
            });
        }

        let adoptable = self.current.filter(|&block| {
            self.cfg
                .block(block)
                .is_some_and(|b| b.is_empty() && !b.flags().contains(BlockFlags::SOURCE_LABEL))
        });
        let block = match adoptable {
            Some(block) => {
                self.cfg.relabel_block(block, label)?;
                if let Some(b) = self.cfg.block_mut(block) {
                    b.insert_flags(BlockFlags::SOURCE_LABEL);
                }
                block
            }
            None => self.open_block(Some(label))?,
        };

        if let Some(sources) = self.forward.remove(&label) {
            for source in sources {
                self.cfg.add_edge(source, block, EdgeType::Branch)?;
            }
        }
        Ok(())
    }

    fn terminate(&mut self, instr: Instr) -> Result<()> {
        let block = self.current()?;
        let targets = instr.targets();
        let falls = matches!(instr, Instr::Branch { .. });
        let returns = instr.is_return();
        let throws = matches!(instr, Instr::Throw(_));
        if let Some(b) = self.cfg.block_mut(block) {
            b.push(instr);
        }

        for target in targets {
            match self.cfg.block_for_label(target) {
                Some(dst) => self.cfg.add_edge(block, dst, EdgeType::Branch)?,
                None => self.forward.entry(target).or_default().push(block),
            }
        }
        let exit = self.cfg.exit();
        if returns {
            self.cfg.add_edge(block, exit, EdgeType::Exit)?;
        }
        if throws && self.open.is_empty() {
            self.cfg.add_edge(block, exit, EdgeType::Exception)?;
        }

        self.current = None;
        self.prev = Some(block);
        self.prev_falls = falls;
        Ok(())
    }

    fn region_start(&mut self, rescue: Label, ensure: Option<Label>) {
        let mut region = ExceptionRegion::new(rescue, ensure);
        match self.current {
            Some(block) if self.is_empty(block) => {
                if let Some(parent) = self.open.last_mut() {
                    parent.remove_block(block);
                }
                region.add_block(block);
            }
            Some(_) => self.close_falling(),
            None => {}
        }
        self.open.push(region);
    }

    fn region_end(&mut self) -> Result<()> {
        let Some(mut region) = self.open.pop() else {
            return Err(Error::UnbalancedRegion {
                scope: self.cfg.name().to_string(),
                detail: "region end without a matching start",
            });
        };
        match self.current {
            Some(block) if self.is_empty(block) => {
                region.remove_block(block);
                if let Some(parent) = self.open.last_mut() {
                    parent.add_block(block);
                }
            }
            Some(_) => self.close_falling(),
            None => {}
        }
        match self.open.last_mut() {
            Some(parent) => parent.add_nested(region),
            None => self.roots.push(region),
        }
        Ok(())
    }

    fn finish(mut self) -> Result<ControlFlowGraph> {
        if !self.open.is_empty() {
            return Err(Error::UnbalancedRegion {
                scope: self.cfg.name().to_string(),
                detail: "region still open at end of scope",
            });
        }

        let exit = self.cfg.exit();
        match (self.current, self.prev) {
            (Some(block), _) => self.cfg.add_edge(block, exit, EdgeType::Exit)?,
            (None, Some(prev)) if self.prev_falls => {
                self.cfg.add_edge(prev, exit, EdgeType::Exit)?;
            }
            _ => {}
        }

        if let Some(&label) = self.forward.keys().next() {
            return Err(Error::UndefinedLabel {
                scope: self.cfg.name().to_string(),
                label,
            });
        }

        for region in &mut self.roots {
            protect(&mut self.cfg, region)?;
        }
        *self.cfg.regions_mut() = self.roots;
        Ok(self.cfg)
    }
}

/// Resolves a region's handlers and protects its blocks, outer regions first.
fn protect(cfg: &mut ControlFlowGraph, region: &mut ExceptionRegion) -> Result<()> {
    let resolve = |cfg: &ControlFlowGraph, label: Label| {
        cfg.block_for_label(label).ok_or_else(|| Error::UndefinedLabel {
            scope: cfg.name().to_string(),
            label,
        })
    };
    let rescue = resolve(cfg, region.first_rescue())?;
    let ensure = match region.ensure() {
        Some(label) => Some(resolve(cfg, label)?),
        None => None,
    };
    region.set_handlers(rescue, ensure);
    if let Some(block) = cfg.block_mut(rescue) {
        block.insert_flags(BlockFlags::RESCUE_ENTRY);
    }

    for &block in region.exclusive_blocks() {
        cfg.set_rescuer(block, Some(rescue));
        cfg.set_ensurer(block, ensure);
        cfg.connect_protection(block)?;
    }
    for nested in region.nested_mut() {
        protect(cfg, nested)?;
    }
    Ok(())
}

/// Applies the post-construction clean-up selected by `config`.
pub(crate) fn clean_up(
    cfg: &mut ControlFlowGraph,
    config: &CompilerConfig,
    events: &EventLog,
) -> Result<()> {
    let name = cfg.name().to_string();
    if config.prune_exception_edges {
        let pruned = cfg.prune_exception_edges();
        if pruned > 0 {
            events
                .record(EventKind::EdgePruned)
                .scope(&name)
                .message(format!("{name}: {pruned} exception edges from non-raising blocks"));
        }
    }

    sweep_unreachable(cfg, config, events);

    if config.collapse_straight_line {
        for (absorber, absorbed) in cfg.collapse_straight_line()? {
            events
                .record(EventKind::BlockMerged)
                .at(&name, absorber)
                .message(format!("{name}: {absorber} absorbed {absorbed}"));
        }
    }
    Ok(())
}

/// Removes or marks dead every block the entry cannot reach.
pub(crate) fn sweep_unreachable(
    cfg: &mut ControlFlowGraph,
    config: &CompilerConfig,
    events: &EventLog,
) {
    let name = cfg.name().to_string();
    let (dead, verb) = if config.remove_unreachable_blocks {
        (cfg.remove_unreachable_blocks(), "removed")
    } else {
        (cfg.mark_unreachable_dead(), "marked dead")
    };
    for block in dead {
        events
            .record(EventKind::BlockRemoved)
            .at(&name, block)
            .message(format!("{name}: unreachable {block} {verb}"));
    }
}
