//! Bounded ring of event slots
//!
//! The ring hands preallocated byte buffers back and forth 
//! between the producer (the acquisition driver) and the 
//! consumer (the data sink). A slot is acquired for writing, 
//! then either published or given back. The consumer 
//! releases every slot it has processed, which makes it 
//! available to the producer again.
//!
//! Backed by two bounded crossbeam channels, one for 
//! free and one for filled slots.

use std::time::{
    Duration,
    Instant,
};

use crossbeam_channel::{
    bounded,
    Sender,
    Receiver,
    RecvTimeoutError,
    TryRecvError,
};

use crate::errors::QueueError;

/// Producer side of an event queue
pub trait EventQueue {
  /// Wait at most `timeout` for a free slot. The slot 
  /// comes back empty.
  fn get_write_slot(&mut self, timeout : Duration) -> Result<Vec<u8>, QueueError>;
  /// Hand a filled slot to the consumer
  fn publish(&mut self, slot : Vec<u8>) -> Result<(), QueueError>;
  /// Give an unused slot back
  fn discard(&mut self, slot : Vec<u8>);
}

/// Create a ring with n_slots buffers of slot_size 
/// bytes capacity
pub fn event_ring(n_slots : usize, slot_size : usize) -> (EventRing, EventRingConsumer) {
  let (free_tx, free_rx)     = bounded::<Vec<u8>>(n_slots);
  let (filled_tx, filled_rx) = bounded::<Vec<u8>>(n_slots);
  for _ in 0..n_slots {
    // can not fail, the channel has room for all slots
    let _ = free_tx.send(Vec::<u8>::with_capacity(slot_size));
  }
  let producer = EventRing {
    free_rx,
    filled_tx,
  };
  let consumer = EventRingConsumer {
    filled_rx,
    free_tx,
  };
  (producer, consumer)
}

pub struct EventRing {
  free_rx   : Receiver<Vec<u8>>,
  filled_tx : Sender<Vec<u8>>,
}

impl EventRing {
  /// Number of slots which are currently free
  pub fn n_free(&self) -> usize {
    self.free_rx.len()
  }
}

impl EventQueue for EventRing {
  
  fn get_write_slot(&mut self, timeout : Duration) -> Result<Vec<u8>, QueueError> {
    match self.free_rx.recv_timeout(timeout) {
      Ok(mut slot) => {
        slot.clear();
        Ok(slot)
      }
      Err(RecvTimeoutError::Timeout)      => Err(QueueError::Timeout),
      Err(RecvTimeoutError::Disconnected) => Err(QueueError::Disconnected),
    }
  }

  fn publish(&mut self, slot : Vec<u8>) -> Result<(), QueueError> {
    match self.filled_tx.send(slot) {
      Err(err) => {
        error!("Unable to publish event! {err}");
        Err(QueueError::Disconnected)
      }
      Ok(_) => Ok(())
    }
  }

  fn discard(&mut self, mut slot : Vec<u8>) {
    // empty slots are passed through the consumer 
    // back to the free list
    slot.clear();
    if let Err(err) = self.filled_tx.send(slot) {
      trace!("Consumer is gone, can not return slot! {err}");
    }
  }
}

/// Consumer side of the ring
pub struct EventRingConsumer {
  filled_rx : Receiver<Vec<u8>>,
  free_tx   : Sender<Vec<u8>>,
}

impl EventRingConsumer {

  /// Wait at most `timeout` for the next published event
  ///
  /// Discarded slots are released on the way.
  pub fn recv_timeout(&self, timeout : Duration) -> Result<Vec<u8>, QueueError> {
    let deadline = Instant::now() + timeout;
    loop {
      match self.filled_rx.recv_deadline(deadline) {
        Ok(slot) => {
          if slot.is_empty() {
            self.release(slot);
            continue;
          }
          return Ok(slot);
        }
        Err(RecvTimeoutError::Timeout)      => return Err(QueueError::Timeout),
        Err(RecvTimeoutError::Disconnected) => return Err(QueueError::Disconnected),
      }
    }
  }

  pub fn try_recv(&self) -> Result<Option<Vec<u8>>, QueueError> {
    loop {
      match self.filled_rx.try_recv() {
        Ok(slot) => {
          if slot.is_empty() {
            self.release(slot);
            continue;
          }
          return Ok(Some(slot));
        }
        Err(TryRecvError::Empty)        => return Ok(None),
        Err(TryRecvError::Disconnected) => return Err(QueueError::Disconnected),
      }
    }
  }

  /// Make a processed slot available to the producer 
  pub fn release(&self, slot : Vec<u8>) {
    if let Err(err) = self.free_tx.send(slot) {
      trace!("Producer is gone, dropping slot! {err}");
    }
  }

  /// Number of events waiting to be processed
  pub fn n_pending(&self) -> usize {
    self.filled_rx.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn full_ring_times_out() {
    let (mut ring, consumer) = event_ring(2, 16);
    let a = ring.get_write_slot(Duration::from_millis(1)).unwrap();
    let b = ring.get_write_slot(Duration::from_millis(1)).unwrap();
    assert_eq!(ring.get_write_slot(Duration::from_millis(1)), Err(QueueError::Timeout));
    ring.publish(vec![1,2,3]).unwrap();
    drop(a);
    drop(b);
    assert_eq!(consumer.n_pending(), 1);
  }

  #[test]
  fn released_slots_come_back() {
    let (mut ring, consumer) = event_ring(1, 16);
    let mut slot = ring.get_write_slot(Duration::from_millis(1)).unwrap();
    slot.extend_from_slice(&[7,7,7]);
    ring.publish(slot).unwrap();
    assert_eq!(ring.n_free(), 0);
    let event = consumer.recv_timeout(Duration::from_millis(10)).unwrap();
    assert_eq!(event, vec![7,7,7]);
    consumer.release(event);
    let slot = ring.get_write_slot(Duration::from_millis(1)).unwrap();
    assert!(slot.is_empty());
  }

  #[test]
  fn discarded_slots_are_not_delivered() {
    let (mut ring, consumer) = event_ring(1, 16);
    let mut slot = ring.get_write_slot(Duration::from_millis(1)).unwrap();
    slot.push(42);
    ring.discard(slot);
    assert_eq!(consumer.try_recv(), Ok(None));
    assert_eq!(ring.n_free(), 1);
  }

  #[test]
  fn consumer_gone() {
    let (mut ring, consumer) = event_ring(1, 16);
    drop(consumer);
    let slot = ring.get_write_slot(Duration::from_millis(1)).unwrap();
    assert_eq!(ring.publish(slot), Err(QueueError::Disconnected));
    assert_eq!(ring.get_write_slot(Duration::from_millis(1)), Err(QueueError::Disconnected));
  }
}
