//! Login handshake
//!
//! challenge → login → node list → device list of the first node → pump.

use tracing::{debug, info, warn};

use super::Timeouts;
use crate::cache::ResourceKey;
use crate::protocol::kinds;
use crate::protocol::messages::{
    challenge_program, device_list_request, device_pump_request, first_device_id, first_node_id,
    has_session_identity, login_request, next_random, node_list_request,
};
use crate::protocol::solve;
use crate::session::Session;
use crate::types::{GatewayError, Result};

/// Identifiers learned while logging in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discovered {
    pub node_id: Option<u64>,
    pub did: Option<u64>,
}

/// Authenticate the freshly opened socket of `session`.
pub(super) async fn authenticate(session: &Session, timeouts: &Timeouts) -> Result<Discovered> {
    session.begin_authentication();
    let correlator = session.correlator();

    let challenge = correlator
        .wait_for(kinds::CHALLENGE, timeouts.challenge)
        .await
        .map_err(|e| match e {
            GatewayError::CorrelationTimeout { .. } => {
                GatewayError::Handshake("No challenge received from server".into())
            }
            other => other,
        })?;
    let program = challenge_program(&challenge)
        .ok_or_else(|| GatewayError::Handshake("Challenge carries no program".into()))?;
    let response = solve(program)?;
    debug!(response, "Challenge solved");

    let credentials = session.credentials().snapshot();
    let login = login_request(&credentials.login, &credentials.password, next_random(), response);
    let reply = correlator
        .exchange(session, &login, kinds::LOGIN, timeouts.login)
        .await?;
    if !has_session_identity(&reply) {
        return Err(GatewayError::Handshake("Login failed".into()));
    }

    session.mark_authenticated();
    info!(login = %credentials.login, "Logged in");

    let mut discovered = Discovered::default();

    let nodes = correlator
        .exchange(session, &node_list_request(), kinds::NODE_LIST, timeouts.node_list)
        .await?;
    session.store().put(&ResourceKey::NodeList, &nodes.body)?;

    let Some(node_id) = first_node_id(&nodes) else {
        warn!("Node list is empty");
        return Ok(discovered);
    };
    discovered.node_id = Some(node_id);
    session.credentials().update_identifiers(Some(node_id), None)?;

    let devices = correlator
        .exchange(
            session,
            &device_list_request(node_id),
            kinds::DEVICE_LIST,
            timeouts.device_list,
        )
        .await?;
    session
        .store()
        .put(&ResourceKey::DeviceList { node_id }, &devices.body)?;

    discovered.did = first_device_id(&devices);
    if let Some(did) = discovered.did {
        correlator.send(session, &device_pump_request(did));
    }

    Ok(discovered)
}
