// Shared test harness - a fake driven page
//
// Stands in for the browser driver: emits request events into the
// session, applies whatever terminal action comes back, and feeds the
// resulting response event to the session the way real page wiring
// would.

#![allow(dead_code)]

use pagemock::{
    CapturedRequest, PageSession, RequestInfo, ResponseEvent, Route, RouteAction,
};
use std::sync::Arc;
use tokio::sync::oneshot;

pub struct FakePage {
    pub session: PageSession,
}

impl FakePage {
    pub fn new() -> Self {
        let session = PageSession::new();
        session.enable();
        Self { session }
    }

    /// Emits a request event. Returns the captured record plus the
    /// receiver on which the terminal action will arrive.
    pub fn request(
        &self,
        info: RequestInfo,
    ) -> (Arc<CapturedRequest>, oneshot::Receiver<RouteAction>) {
        let (route, rx) = Route::new(info);
        let captured = self
            .session
            .handle_request(route)
            .expect("handle_request failed");
        (captured, rx)
    }

    pub fn get(&self, url: &str) -> (Arc<CapturedRequest>, oneshot::Receiver<RouteAction>) {
        self.request(RequestInfo::new(url, "GET"))
    }

    /// Drives one request to completion: emits it, waits for the
    /// terminal action, and feeds back the matching response event.
    pub async fn drive(&self, info: RequestInfo) -> Arc<CapturedRequest> {
        let (captured, rx) = self.request(info);
        let action = rx.await.expect("request left unresolved");
        self.complete(&captured, action);
        captured
    }

    pub async fn drive_get(&self, url: &str) -> Arc<CapturedRequest> {
        self.drive(RequestInfo::new(url, "GET")).await
    }

    /// Applies a terminal action the way the page's network stack would:
    /// a fulfillment becomes that response, a continue reaches the
    /// "real" backend (which answers 200 "passthrough-body"), an abort
    /// never produces a response event.
    pub fn complete(&self, captured: &Arc<CapturedRequest>, action: RouteAction) {
        let event = match action {
            RouteAction::Fulfill(response) => {
                let mut event = ResponseEvent::new(response.status).with_headers(response.headers);
                if let Some(body) = response.body {
                    event = event.with_body(body);
                }
                event
            }
            RouteAction::Continue(_) => ResponseEvent::new(200).with_body("passthrough-body"),
            RouteAction::Abort(_) => return,
        };
        self.session
            .handle_response(captured.id(), event)
            .expect("handle_response failed");
    }
}
