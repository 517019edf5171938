//! Transient user-facing notices for gateway outcomes.
//!
//! A notifier only reports; nothing it does feeds back into catalog state.

use std::sync::Mutex;

use log::{info, warn};

use crate::app_response::AppResponse;

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &AppResponse);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &AppResponse) {
        if notice.is_ok() {
            info!("{}", notice.message());
        } else {
            warn!("{}", notice);
        }
    }
}

/// Keeps notices until a view drains them.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<AppResponse>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<AppResponse> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(_) => Vec::new(),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: &AppResponse) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, notice: &AppResponse) {
        (**self).notify(notice)
    }
}
