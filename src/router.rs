use uuid::Uuid;

use crate::entities::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Home,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Home => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Redirect(Route),
    Load,
}

/// Reacts to changes of the (view, signed-in user) pair, once per change.
#[derive(Debug, Default)]
pub struct SessionGate {
    last_seen: Option<(Route, Option<Uuid>)>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, route: Route, session: Option<&Session>) -> Option<GateAction> {
        let key = (route, session.map(|s| s.user.id));
        if self.last_seen == Some(key) {
            return None;
        }
        self.last_seen = Some(key);
        match (route, session) {
            (Route::Home, None) => Some(GateAction::Redirect(Route::Login)),
            (Route::Home, Some(_)) => Some(GateAction::Load),
            (Route::Login, Some(_)) => Some(GateAction::Redirect(Route::Home)),
            (Route::Login, None) => None,
        }
    }
}
