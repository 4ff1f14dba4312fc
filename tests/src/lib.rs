//! Integration tests driving the orchestrator end to end with scripted
//! probers and samplers, plus the on-disk target store.

#[cfg(test)]
mod support;

#[cfg(test)]
mod orchestration {
    mod cancellation;
    mod integration;
    mod throttling;
}

#[cfg(test)]
mod persistence {
    mod integration;
}
