use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum TrySendError<T> {
    /// No había un worker esperando ni lugar en el buffer.
    Full(T),
    Closed(T),
}

/// Cola de admisión entre el manager y los workers.
///
/// Con `capacity == 0` es un hand-off directo: el envío sólo funciona si
/// hay un worker bloqueado en `recv` en ese mismo instante. Con
/// `capacity > 0` además pueden esperar hasta `capacity` pedidos en buffer.
/// El envío nunca bloquea.
pub struct AdmissionQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
}

struct QueueState<T> {
    buffer: VecDeque<T>,
    // workers parados en recv()
    waiting: VecDeque<oneshot::Sender<T>>,
    closed: bool,
}

impl<T> AdmissionQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                buffer: VecDeque::with_capacity(capacity),
                waiting: VecDeque::new(),
                closed: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        let mut state = self.state();
        if state.closed {
            return Err(TrySendError::Closed(item));
        }

        let mut item = item;
        while let Some(waiter) = state.waiting.pop_front() {
            match waiter.send(item) {
                Ok(()) => return Ok(()),
                // ese worker ya no está escuchando, probamos con el siguiente
                Err(back) => item = back,
            }
        }

        if state.buffer.len() < self.capacity {
            state.buffer.push_back(item);
            return Ok(());
        }
        Err(TrySendError::Full(item))
    }

    /// Espera el próximo pedido. Devuelve `None` cuando la cola está
    /// cerrada y ya no quedan pedidos en buffer.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let rx = {
                let mut state = self.state();
                if let Some(item) = state.buffer.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
                let (tx, rx) = oneshot::channel();
                state.waiting.push_back(tx);
                rx
            };

            match rx.await {
                Ok(item) => return Some(item),
                // se cerró la cola mientras esperábamos: volvemos a mirar el buffer
                Err(_) => continue,
            }
        }
    }

    /// Cierra la cola para nuevos envíos. Los workers en espera se
    /// despiertan y lo que quedó en buffer se sigue entregando.
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.waiting.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state().buffer.len()
    }

    /// Workers bloqueados en `recv` ahora mismo.
    pub fn idle_receivers(&self) -> usize {
        self.state()
            .waiting
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}
