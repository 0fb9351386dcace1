//! Per-line protocol dispatch
//!
//! Every decoded input line lands here exactly once. An endpoint with a
//! live peer is a passthrough: apart from `exit` and `chdir`, lines are
//! forwarded verbatim and the peer's prompt is redrawn. An unbound
//! endpoint gets command dispatch against its own command set.
//!
//! Dispatch is synchronous. All side effects are channel sends and lock
//! updates, so a line is fully processed before the next one is read.

use tracing::{debug, info, warn};

use tether_core::EndpointKind;
use tether_protocol::{Command, Line};

use crate::endpoint::EndpointHandle;
use crate::state::ControllerState;

/// Properties `info <prop>` may introspect
const INFO_PROPS: [&str; 6] = ["id", "kind", "signature", "prompt", "commands", "system_info"];

/// Composite prompt shown to a bound client: `<signature>:<cwd>:<base>`
fn compose_prompt(signature: &str, cwd: &str, base: &str) -> String {
    format!("{}:{}:{}", signature, cwd, base)
}

/// Handle one decoded input line from an endpoint
pub fn dispatch_line(state: &ControllerState, ep: &EndpointHandle, input: &str) {
    let line = Line::parse(input);

    if let Some(peer) = state.peer_of(ep.id) {
        match line.command() {
            Some(Command::Exit) => reset(state, ep),
            Some(Command::Chdir) => {
                if let Some(cwd) = line.arg(0) {
                    ep.set_cwd(cwd);
                }
                peer.set_prompt(Some(compose_prompt(
                    &ep.signature(),
                    &ep.cwd(),
                    &state.config.prompt,
                )));
                peer.show_prompt();
            }
            _ => {
                debug!("Relaying line from {} to {}", ep.id, peer.id);
                peer.write_line(input);
                peer.show_prompt();
            }
        }
        return;
    }

    match line.command().filter(|cmd| ep.commands.contains(*cmd)) {
        Some(Command::Reg) => reg(state, ep, line.arg(0)),
        Some(Command::Ping) => ep.send("pong"),
        Some(Command::Info) => show_info(ep, line.arg(0)),
        Some(Command::Help) => ep.send(&format!("HELP: Commands: {}", ep.commands.join())),
        Some(Command::Exit) => exit(state, ep, &line.rest()),
        Some(Command::Ls) => ep.send(&render_agent_list(state, &[])),
        Some(Command::Use) => use_agent(state, ep, line.arg(0)),
        _ => {
            warn!("Unknown cmd: {}", line.head);
            ep.send(&format!(
                "Unknown cmd: {} (available: {})",
                line.head,
                ep.commands.join()
            ));
        }
    }
}

/// `reg <signature>`: adopt a signature and, for agents, tell every
/// unbound authorized client a new target is available.
fn reg(state: &ControllerState, ep: &EndpointHandle, sig: Option<&str>) {
    match sig.filter(|s| !s.is_empty()) {
        Some(sig) => {
            ep.set_signature(sig);
            info!("{} registered as: {}", ep.kind.label(), sig);
            ep.send(&format!("Registered as: {}", sig));

            if ep.kind == EndpointKind::Agent {
                notify_agent_registered(state);
            }
            state.snapshot();
        }
        None => {
            warn!("Cannot register without signature!");
            ep.send("Cannot register without signature!");
        }
    }
}

/// Push a refreshed agent listing to every client that could act on it
fn notify_agent_registered(state: &ControllerState) {
    let watchers = state
        .registry
        .clients()
        .into_iter()
        .chain(state.registry.web_clients())
        .filter(|client| client.is_authorized());

    for client in watchers {
        if state.peer_of(client.id).is_none() {
            client.send(&render_agent_list(state, &["\n** New agent connected! **"]));
        }
    }
}

/// `info <prop>`: introspect one endpoint property as pretty JSON
fn show_info(ep: &EndpointHandle, prop: Option<&str>) {
    let value = match prop {
        Some("id") => serde_json::json!(ep.id.to_string()),
        Some("kind") => serde_json::json!(ep.kind.to_string()),
        Some("signature") => serde_json::json!(ep.signature()),
        Some("prompt") => serde_json::json!(ep.prompt()),
        Some("commands") => serde_json::json!(ep.commands.join()),
        Some("system_info") => serde_json::json!(ep.system_info()),
        _ => {
            warn!("Show info missing prop!");
            ep.send(&format!(
                "Show info missing prop! ({})",
                INFO_PROPS.join(", ")
            ));
            return;
        }
    };

    let body = serde_json::to_string_pretty(&value).unwrap_or_else(|_| "null".to_string());
    ep.send(&body);
}

/// `exit` while unbound: farewell, then tear the connection down
fn exit(state: &ControllerState, ep: &EndpointHandle, msg: &str) {
    let msg = if msg.is_empty() { "Goodbye." } else { msg };
    ep.send_final(&format!("{}\n", msg));
    ep.close();
    disconnect(state, ep);
}

/// Render the indexed agent listing, optionally headed by extra lines
pub fn render_agent_list(state: &ControllerState, header: &[&str]) -> String {
    let agents = state.registry.agents();
    let mut lines: Vec<String> = header.iter().map(|s| s.to_string()).collect();
    lines.push("Agent list:".to_string());

    if agents.is_empty() {
        lines.push("\tNo available agents".to_string());
    } else {
        for (index, agent) in agents.iter().enumerate() {
            lines.push(format!("\t[{}] {} | {}", index, agent.signature(), agent.id));
        }
        lines.push(String::new());
        lines.push(format!(
            "Select an available agent with: \"use [0-{}]\"",
            agents.len() - 1
        ));
    }

    lines.join("\n")
}

/// `use <index>`: bind to the agent at that `ls` position
fn use_agent(state: &ControllerState, ep: &EndpointHandle, target: Option<&str>) {
    let selection = target
        .and_then(|t| t.parse::<usize>().ok())
        .and_then(|index| state.registry.agent_at(index).map(|agent| (index, agent)));

    match selection {
        Some((index, agent)) => {
            let msg = format!("Using [{}]: {} | {}", index, agent.signature(), agent.id);

            ep.set_prompt(Some(compose_prompt(
                &agent.signature(),
                &agent.cwd(),
                &state.config.prompt,
            )));

            info!("{}", msg);
            ep.send(&msg);
            state.pairs.bind(ep.id, agent.id);
        }
        None => {
            ep.send(&format!(
                "Missing/invalid agent target: {}",
                target.unwrap_or_default()
            ));
        }
    }
}

/// Drop out of a relay pair: restore the base prompt, tell the peer's
/// remote side to wind down, and clear this endpoint's own pairing entry.
pub fn reset(state: &ControllerState, ep: &EndpointHandle) {
    ep.set_prompt(Some(state.config.prompt.clone()));

    if let Some(peer_id) = state.pairs.unbind(ep.id) {
        if let Some(peer) = state.registry.get(peer_id) {
            debug!("Exit relay: {} {}", peer.signature(), peer.id);
            peer.write_line("exit");
        }
    }

    if ep.kind != EndpointKind::Agent {
        ep.show_prompt();
    }
}

/// Tear down a departed endpoint. Idempotent: the reader loop hitting
/// EOF and an explicit `exit` may both land here.
pub fn disconnect(state: &ControllerState, ep: &EndpointHandle) {
    if !ep.begin_disconnect() {
        return;
    }

    debug!("Disconnecting {} {}", ep.kind, ep.id);
    state.registry.remove(ep.id, ep.kind);

    if let Some(peer_id) = state.pairs.unbind(ep.id) {
        if let Some(peer) = state.registry.get(peer_id) {
            reset(state, &peer);
        }
    }

    state.snapshot();
    let (agents, clients, web_clients) = state.registry.counts();
    debug!(
        "{} agent(s) | {} client(s) | {} web client(s)",
        agents, clients, web_clients
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::test_support::{drain, handle};
    use crate::endpoint::Outbound;
    use std::sync::Arc;
    use tether_core::config::ControllerConfig;
    use tokio::sync::mpsc;

    fn state() -> Arc<ControllerState> {
        ControllerState::new(ControllerConfig::default())
    }

    /// A registered agent with a signature, plus its outbox
    fn connected_agent(
        state: &ControllerState,
        sig: &str,
    ) -> (Arc<EndpointHandle>, mpsc::UnboundedReceiver<Outbound>) {
        let (agent, rx) = handle(EndpointKind::Agent);
        agent.set_signature(sig);
        state.registry.insert(Arc::clone(&agent));
        (agent, rx)
    }

    fn connected_client(
        state: &ControllerState,
    ) -> (Arc<EndpointHandle>, mpsc::UnboundedReceiver<Outbound>) {
        let (client, rx) = handle(EndpointKind::Client);
        state.registry.insert(Arc::clone(&client));
        (client, rx)
    }

    #[test]
    fn test_ping_pong() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "ping");
        assert_eq!(drain(&mut rx), "pong\ntether> ");
    }

    #[test]
    fn test_unknown_command_lists_available() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "frobnicate");
        let out = drain(&mut rx);
        assert!(out.contains("Unknown cmd: frobnicate"));
        assert!(out.contains("reg, exit, ping, info, help, ls, use"));
    }

    #[test]
    fn test_agent_cannot_use_client_commands() {
        let state = state();
        let (_, _arx) = connected_agent(&state, "bob@host1");
        let (agent, mut rx) = connected_agent(&state, "eve@host2");

        dispatch_line(&state, &agent, "ls");
        // Agents have no prompt, so even the error reply is dropped
        assert_eq!(drain(&mut rx), "");
        assert!(state.pairs.is_empty());
    }

    #[test]
    fn test_ls_empty() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "ls");
        let out = drain(&mut rx);
        assert!(out.contains("Agent list:"));
        assert!(out.contains("\tNo available agents"));
    }

    #[test]
    fn test_ls_lists_agents_in_connect_order() {
        let state = state();
        let (first, _rx1) = connected_agent(&state, "bob@host1");
        let (_, _rx2) = connected_agent(&state, "eve@host2");
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "ls");
        let out = drain(&mut rx);
        assert!(out.contains(&format!("\t[0] bob@host1 | {}", first.id)));
        assert!(out.contains("\t[1] eve@host2 |"));
        assert!(out.contains("Select an available agent with: \"use [0-1]\""));
    }

    #[test]
    fn test_reg_notifies_unbound_clients() {
        let state = state();
        let (client, mut rx) = connected_client(&state);
        let (agent, _arx) = connected_agent(&state, "agent");

        dispatch_line(&state, &agent, "reg bob@host1");
        let out = drain(&mut rx);
        assert!(out.contains("** New agent connected! **"));
        assert!(out.contains("[0] bob@host1"));
        let _ = client;
    }

    #[test]
    fn test_reg_skips_bound_clients() {
        let state = state();
        let (bound, mut bound_rx) = connected_client(&state);
        let (agent1, _rx1) = connected_agent(&state, "bob@host1");
        state.pairs.bind(bound.id, agent1.id);
        drain(&mut bound_rx);

        let (agent2, _rx2) = connected_agent(&state, "eve@host2");
        dispatch_line(&state, &agent2, "reg eve@host2");
        assert_eq!(drain(&mut bound_rx), "");
    }

    #[test]
    fn test_reg_without_signature() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "reg");
        assert!(drain(&mut rx).contains("Cannot register without signature!"));
    }

    #[test]
    fn test_info_allowed_prop() {
        let state = state();
        let (client, mut rx) = connected_client(&state);
        client.set_signature("operator");

        dispatch_line(&state, &client, "info signature");
        assert!(drain(&mut rx).contains("\"operator\""));
    }

    #[test]
    fn test_info_unknown_prop_lists_allowed() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "info outbox");
        let out = drain(&mut rx);
        assert!(out.contains("Show info missing prop!"));
        assert!(out.contains("system_info"));
    }

    #[test]
    fn test_use_binds_and_updates_prompt() {
        let state = state();
        let (agent, _arx) = connected_agent(&state, "bob@host1");
        agent.set_cwd("/home/bob");
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "use 0");

        let out = drain(&mut rx);
        assert!(out.contains(&format!("Using [0]: bob@host1 | {}", agent.id)));
        assert!(out.ends_with("bob@host1:/home/bob:tether> "));
        assert_eq!(state.pairs.peer_of(client.id), Some(agent.id));
        assert_eq!(state.pairs.peer_of(agent.id), Some(client.id));
    }

    #[test]
    fn test_use_invalid_index() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "use 7");
        assert!(drain(&mut rx).contains("Missing/invalid agent target: 7"));

        dispatch_line(&state, &client, "use");
        assert!(drain(&mut rx).contains("Missing/invalid agent target: "));
    }

    #[test]
    fn test_bound_lines_are_forwarded_with_prompt_redraw() {
        let state = state();
        let (agent, mut agent_rx) = connected_agent(&state, "bob@host1");
        let (client, mut client_rx) = connected_client(&state);
        state.pairs.bind(client.id, agent.id);

        dispatch_line(&state, &client, "echo hi");
        // Agent transport gets the line; the agent itself has no prompt
        assert_eq!(drain(&mut agent_rx), "echo hi\n");

        // Replies flow back and redraw the client prompt
        client.set_prompt(Some("bob@host1:/home/bob:tether> ".to_string()));
        dispatch_line(&state, &agent, "hi");
        dispatch_line(&state, &agent, "echo hi [OK]");
        let out = drain(&mut client_rx);
        assert!(out.contains("hi\n"));
        assert!(out.contains("echo hi [OK]\n"));
        assert!(out.ends_with("\nbob@host1:/home/bob:tether> "));
    }

    #[test]
    fn test_chdir_updates_cwd_and_peer_prompt() {
        let state = state();
        let (agent, _arx) = connected_agent(&state, "bob@host1");
        let (client, mut rx) = connected_client(&state);
        state.pairs.bind(client.id, agent.id);

        dispatch_line(&state, &agent, "chdir /tmp");

        assert_eq!(agent.cwd(), "/tmp");
        assert_eq!(
            client.prompt().as_deref(),
            Some("bob@host1:/tmp:tether> ")
        );
        assert!(drain(&mut rx).ends_with("\nbob@host1:/tmp:tether> "));
    }

    #[test]
    fn test_exit_while_bound_unwinds_both_sides() {
        let state = state();
        let (agent, mut agent_rx) = connected_agent(&state, "bob@host1");
        let (client, mut client_rx) = connected_client(&state);
        state.pairs.bind(client.id, agent.id);
        client.set_prompt(Some("bob@host1:/home/bob:tether> ".to_string()));

        // Operator leaves the session: exit travels to the remote agent
        dispatch_line(&state, &client, "exit");
        assert_eq!(drain(&mut agent_rx), "exit\n");
        assert_eq!(client.prompt().as_deref(), Some("tether> "));
        assert_eq!(state.pairs.peer_of(client.id), None);
        assert_eq!(state.pairs.peer_of(agent.id), Some(client.id));

        // The remote agent's echo unwinds the surviving direction
        dispatch_line(&state, &agent, "exit [OK]");
        assert_eq!(state.pairs.peer_of(agent.id), None);
        assert!(state.pairs.is_empty());
        // The client saw its restored prompt, then the literal exit echo
        assert_eq!(drain(&mut client_rx), "\ntether> exit\n");
    }

    #[test]
    fn test_exit_unbound_closes_connection() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "exit");

        let mut saw_shutdown = false;
        let mut out = String::new();
        while let Ok(item) = rx.try_recv() {
            match item {
                Outbound::Raw(s) => out.push_str(&s),
                Outbound::Shutdown => saw_shutdown = true,
            }
        }
        assert_eq!(out, "Goodbye.\n");
        assert!(saw_shutdown);
        assert_eq!(state.registry.counts(), (0, 0, 0));
    }

    #[test]
    fn test_exit_with_message() {
        let state = state();
        let (client, mut rx) = connected_client(&state);

        dispatch_line(&state, &client, "exit See you around");
        assert!(drain(&mut rx).starts_with("See you around\n"));
    }

    #[test]
    fn test_disconnect_resets_surviving_peer() {
        let state = state();
        let (agent, _arx) = connected_agent(&state, "bob@host1");
        let (client, mut rx) = connected_client(&state);
        state.pairs.bind(client.id, agent.id);
        client.set_prompt(Some("bob@host1:/home/bob:tether> ".to_string()));

        disconnect(&state, &agent);

        assert_eq!(state.registry.counts(), (0, 1, 0));
        assert_eq!(client.prompt().as_deref(), Some("tether> "));
        assert!(state.pairs.is_empty());
        assert!(drain(&mut rx).ends_with("\ntether> "));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let state = state();
        let (client, _rx) = connected_client(&state);

        disconnect(&state, &client);
        disconnect(&state, &client);
        assert_eq!(state.registry.counts(), (0, 0, 0));
    }

    #[test]
    fn test_stale_pair_entry_falls_back_to_dispatch() {
        let state = state();
        let (agent, _arx) = connected_agent(&state, "bob@host1");
        let (client, mut rx) = connected_client(&state);
        state.pairs.bind(client.id, agent.id);

        // Agent vanishes without the client's entry being cleaned up
        state.registry.remove(agent.id, EndpointKind::Agent);

        dispatch_line(&state, &client, "ping");
        assert_eq!(drain(&mut rx), "pong\ntether> ");
    }
}
