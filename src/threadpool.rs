//! Fixed-size worker thread pool (spec §4.9/§5: thread-per-connection
//! scheduling). One job runs to completion on whichever worker picks it off
//! the shared channel; nothing here assumes the job is a connection, so the
//! type stays generic over `Task` the way the teacher's pool does.

use std::{
    sync::{Arc, Mutex, mpsc},
    thread,
};

pub trait Task: Send + 'static {
    fn run(self);
}

/// A boxed closure job, for callers (e.g. the acceptor loop) that don't need
/// a named `Task` type for the one-off work of serving a connection.
pub struct Job(Box<dyn FnOnce() + Send>);

impl Job {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl Task for Job {
    fn run(self) {
        (self.0)()
    }
}

pub struct ThreadPool<J: Task> {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<J>>,
}

impl<J: Task> ThreadPool<J> {
    pub fn new(size: usize) -> Self {
        assert!(size > 0);
        let (sender, receiver) = mpsc::channel::<J>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);

        for _ in 0..size {
            workers.push(Worker::new(Arc::clone(&receiver)));
        }

        Self {
            workers,
            sender: Some(sender),
        }
    }

    #[inline]
    pub fn execute(&self, job: J) {
        self.sender.as_ref().unwrap().send(job).unwrap();
    }
}

impl<J: Task> Drop for ThreadPool<J> {
    fn drop(&mut self) {
        drop(self.sender.take()); // closes channel; workers exit
        for w in &mut self.workers {
            if let Some(t) = w.thread.take() {
                t.join().unwrap();
            }
        }
    }
}

struct Worker {
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new<J: Task>(receiver: Arc<Mutex<mpsc::Receiver<J>>>) -> Self {
        let thread = thread::spawn(move || {
            loop {
                let msg = {
                    let rx = receiver.lock().unwrap();
                    rx.recv()
                };
                match msg {
                    Ok(job) => job.run(),
                    Err(_) => break, // sender dropped
                }
            }
        });
        Self {
            thread: Some(thread),
        }
    }
}
