use crate::admission::AdmissionGate;
use crate::execution::ExecutionEngine;

pub struct AppState {
    pub execution: ExecutionEngine,
    pub admission: AdmissionGate,
}
