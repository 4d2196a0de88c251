//! Mock kernels and code generator shared by the integration tests.

#![allow(dead_code)]

use offload_rs::prelude::*;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Sub-task identified by its canonical text.
#[derive(Debug)]
pub struct MockTask {
    pub text: String,
}

impl SubTask for MockTask {
    fn canonical_text(&self) -> String {
        self.text.clone()
    }
}

/// Execution context: the position of the record in its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctx {
    pub seq: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Flat,
    OffloadRoot,
    Nested,
}

#[derive(Debug)]
pub struct MockKernel {
    pub name: String,
    pub tasks: Vec<Arc<MockTask>>,
    pub shape: Shape,
    pub lowered: AtomicBool,
    pub lower_calls: AtomicUsize,
    pub lower_fails: bool,
}

impl MockKernel {
    pub fn new(name: &str, texts: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tasks: texts
                .iter()
                .map(|t| Arc::new(MockTask { text: t.to_string() }))
                .collect(),
            shape: Shape::Flat,
            lowered: AtomicBool::new(false),
            lower_calls: AtomicUsize::new(0),
            lower_fails: false,
        }
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    pub fn failing_lowering(mut self) -> Self {
        self.lower_fails = true;
        self
    }
}

impl Kernel for MockKernel {
    type Task = MockTask;
    type Context = Ctx;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_lowered(&self) -> bool {
        self.lowered.load(Ordering::SeqCst)
    }

    fn lower(&self) -> Result<()> {
        self.lower_calls.fetch_add(1, Ordering::SeqCst);
        if self.lower_fails {
            return Err(Error::Other("unsupported loop nest".into()));
        }
        self.lowered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ir(&self) -> IrNode<MockTask> {
        let offloads = || self.tasks.iter().cloned().map(IrNode::Offload).collect::<Vec<_>>();
        match self.shape {
            Shape::Flat => IrNode::Block(offloads()),
            Shape::OffloadRoot => IrNode::Offload(self.tasks[0].clone()),
            Shape::Nested => IrNode::Block(vec![
                IrNode::Offload(self.tasks[0].clone()),
                IrNode::Block(offloads()),
            ]),
        }
    }

    fn context(&self) -> Ctx {
        Ctx { seq: 0 }
    }
}

/// What the mock code generator and its artifacts observed.
#[derive(Debug, Default)]
pub struct Probe {
    pub codegen_calls: AtomicUsize,
    pub compiled: Mutex<Vec<(String, Instant)>>,
    pub executed: Mutex<Vec<(usize, String, Instant)>>,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.codegen_calls.load(Ordering::SeqCst)
    }

    pub fn executed_seqs(&self) -> Vec<usize> {
        self.executed.lock().iter().map(|(seq, _, _)| *seq).collect()
    }

    pub fn executed_texts(&self) -> Vec<String> {
        self.executed.lock().iter().map(|(_, text, _)| text.clone()).collect()
    }

    pub fn compiled_at(&self, text: &str) -> Option<Instant> {
        self.compiled
            .lock()
            .iter()
            .find(|(t, _)| t == text)
            .map(|(_, at)| *at)
    }
}

/// Code generator whose artifacts log their invocations to a [`Probe`].
#[derive(Debug, Default)]
pub struct MockCodeGen {
    pub probe: Arc<Probe>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    panicking_artifacts: HashSet<String>,
}

impl MockCodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub fn failing(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn panicking(mut self, text: &str) -> Self {
        self.panicking.insert(text.to_string());
        self
    }

    pub fn panicking_artifact(mut self, text: &str) -> Self {
        self.panicking_artifacts.insert(text.to_string());
        self
    }
}

impl CodeGen<MockKernel> for MockCodeGen {
    fn codegen(&self, _kernel: &MockKernel, task: &MockTask) -> Result<Artifact<Ctx>> {
        self.probe.codegen_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&task.text) {
            thread::sleep(*delay);
        }
        if self.panicking.contains(&task.text) {
            panic!("codegen exploded on `{}`", task.text);
        }
        if self.failing.contains(&task.text) {
            return Err(Error::Other(format!("unsupported statement in `{}`", task.text)));
        }

        self.probe
            .compiled
            .lock()
            .push((task.text.clone(), Instant::now()));

        let probe = self.probe.clone();
        let text = task.text.clone();
        let explode = self.panicking_artifacts.contains(&task.text);

        Ok(Arc::new(move |ctx: &mut Ctx| {
            if explode {
                panic!("device fault in `{}`", text);
            }
            probe
                .executed
                .lock()
                .push((ctx.seq, text.clone(), Instant::now()));
        }))
    }
}

pub fn kernel(name: &str, texts: &[&str]) -> Arc<MockKernel> {
    Arc::new(MockKernel::new(name, texts))
}

/// Record for the `idx`-th task of `kernel`, tagged with `seq`.
pub fn record(kernel: &Arc<MockKernel>, idx: usize, seq: usize) -> LaunchRecord<MockKernel> {
    LaunchRecord::new(Ctx { seq }, kernel.clone(), kernel.tasks[idx].clone())
}

pub fn config() -> ConfigBuilder {
    Config::builder()
        .compile_threads(4)
        .thread_name_prefix("offload-test")
        .stack_size(2 * 1024 * 1024)
}

pub fn queue(
    config: Config,
    codegen: MockCodeGen,
) -> (ExecutionQueue<MockKernel, MockCodeGen>, Arc<Probe>) {
    let probe = codegen.probe.clone();
    (ExecutionQueue::new(config, codegen).unwrap(), probe)
}
