use std::fmt;

use crate::workflow::WorkflowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    WorkflowList,
    Capture(WorkflowId),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowList => f.write_str("/"),
            Self::Capture(id) => write!(f, "/workflow/{id}/capture"),
        }
    }
}

pub trait Navigator {
    fn navigate(&self, route: Route);
}

impl<F: Fn(Route)> Navigator for F {
    fn navigate(&self, route: Route) {
        self(route);
    }
}
