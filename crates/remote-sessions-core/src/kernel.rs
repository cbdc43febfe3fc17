//! Minimal kernel connector.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{ConnectOptions, KernelConnection, KernelConnector, KernelModel};

/// Kernel connection that only tracks identity and disposal.
///
/// Stands in where no kernel protocol is needed, e.g. a manager that only
/// lists and stops sessions.
#[derive(Debug)]
pub struct KernelHandle {
    model: KernelModel,
    options: ConnectOptions,
    disposed: AtomicBool,
}

impl KernelHandle {
    #[must_use]
    pub fn new(model: KernelModel, options: ConnectOptions) -> Self {
        Self {
            model,
            options,
            disposed: AtomicBool::new(false),
        }
    }

    /// Client identity the handle was opened with.
    #[must_use]
    pub const fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

impl KernelConnection for KernelHandle {
    fn id(&self) -> String {
        self.model.id.clone()
    }

    fn name(&self) -> String {
        self.model.name.clone()
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            tracing::debug!(kernel_id = %self.model.id, "Disposed kernel handle");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

/// Connector producing [`KernelHandle`]s.
#[derive(Debug, Default, Clone)]
pub struct BasicKernelConnector;

impl KernelConnector for BasicKernelConnector {
    fn connect_to(
        &self,
        kernel: &KernelModel,
        options: &ConnectOptions,
    ) -> Arc<dyn KernelConnection> {
        Arc::new(KernelHandle::new(kernel.clone(), options.clone()))
    }
}
