// src/kernel/resource/endpoint.rs

//! IPC message endpoints
//!
//! A named FIFO channel. Senders enqueue byte payloads; receivers drain
//! them oldest-first, parking in the `Waiting` state while the queue is
//! empty. A send to an endpoint with a parked receiver hands the payload
//! over directly and produces a wakeup the scheduler applies. Destroying
//! an endpoint fails every parked receiver with `EndpointClosed`.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;

use max_os_abi::{SyscallError, MAX_MESSAGE_SIZE};

use crate::kernel::process::ThreadId;
use crate::kernel::resource::Wakeup;

/// A receiver parked on an empty endpoint.
///
/// The buffer pointer stays valid while the thread is parked: the thread
/// cannot run, so the stack or allocation the buffer lives in cannot
/// move or be reclaimed before the wakeup.
#[derive(Debug)]
struct ParkedReceiver {
    thread: ThreadId,
    buffer: u64,
    capacity: u64,
}

/// Outcome of a send.
#[derive(Debug)]
pub enum SendOutcome {
    /// Payload queued for a later receive.
    Queued,
    /// Payload handed directly to a parked receiver; apply the wakeup.
    Delivered(Wakeup),
}

/// A named FIFO message channel.
#[derive(Debug)]
pub struct MessageEndpoint {
    name: String,
    queue: VecDeque<Vec<u8>>,
    parked: VecDeque<ParkedReceiver>,
}

impl MessageEndpoint {
    /// An empty endpoint.
    pub fn new(name: &str) -> Self {
        Self {
            name: String::from(name),
            queue: VecDeque::new(),
            parked: VecDeque::new(),
        }
    }

    /// The published name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages waiting to be received.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Receivers currently parked on the endpoint.
    #[must_use]
    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    /// Send a payload into the endpoint.
    ///
    /// If a receiver is parked, the payload is copied straight into its
    /// buffer and the returned wakeup carries the byte count the
    /// receiver's syscall resumes with. Otherwise the payload is queued.
    pub fn send(&mut self, payload: &[u8]) -> Result<SendOutcome, SyscallError> {
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(SyscallError::MessageTooLarge);
        }

        if let Some(receiver) = self.parked.pop_front() {
            let copied = copy_to_buffer(payload, receiver.buffer, receiver.capacity);
            return Ok(SendOutcome::Delivered(Wakeup {
                thread: receiver.thread,
                result: Ok(copied),
            }));
        }

        let mut message = Vec::new();
        message
            .try_reserve_exact(payload.len())
            .map_err(|_| SyscallError::OutOfMemory)?;
        message.extend_from_slice(payload);
        self.queue.push_back(message);
        Ok(SendOutcome::Queued)
    }

    /// Take the oldest queued message, copying it into `buffer`.
    ///
    /// Returns the byte count, or `None` when the queue is empty and the
    /// caller should park.
    pub fn try_receive(&mut self, buffer: u64, capacity: u64) -> Option<u64> {
        let message = self.queue.pop_front()?;
        Some(copy_to_buffer(&message, buffer, capacity))
    }

    /// Park a receiver until a message arrives or the endpoint closes.
    pub fn park_receiver(&mut self, thread: ThreadId, buffer: u64, capacity: u64) {
        self.parked.push_back(ParkedReceiver {
            thread,
            buffer,
            capacity,
        });
    }

    /// Forget parked receivers belonging to the given threads.
    ///
    /// Used when a parked thread is reclaimed: its buffer pointer dies
    /// with its stack, so the entry must never be handed a payload.
    pub fn purge_receivers(&mut self, dead: &[ThreadId]) {
        self.parked.retain(|receiver| !dead.contains(&receiver.thread));
    }

    /// Fail every parked receiver, for endpoint destruction.
    pub fn close(&mut self) -> Vec<Wakeup> {
        self.queue.clear();
        self.parked
            .drain(..)
            .map(|receiver| Wakeup {
                thread: receiver.thread,
                result: Err(SyscallError::EndpointClosed),
            })
            .collect()
    }
}

/// Copy a payload into a receiver buffer, truncating to capacity.
fn copy_to_buffer(payload: &[u8], buffer: u64, capacity: u64) -> u64 {
    let count = payload.len().min(capacity as usize);
    if count > 0 && buffer != 0 {
        // SAFETY: the syscall layer validated the buffer pointer and
        // capacity before parking or receiving; the owning thread is
        // suspended, so the buffer cannot be concurrently touched.
        unsafe {
            core::ptr::copy_nonoverlapping(payload.as_ptr(), buffer as *mut u8, count);
        }
    }
    count as u64
}
