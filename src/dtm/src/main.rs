use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use anyhow::Result;
use structopt::StructOpt;

use dtm::argument::Opts;
use dtm::config::ConfigData;
use dtm::engine::Dtm;
use dtm::message::{self, Message};
use dtm::ovs::OvsSwitch;
use dtm::stats::PortStatsPoller;

fn main() -> Result<()> {
    logging::init_log();

    let opts = Opts::from_args();
    log::info!("opts: {:#?}", opts);

    let engine = Arc::new(Dtm::new());
    let config = ConfigData::from_path(&opts.config)?;
    engine.set_config(config)?;
    engine.bind(Arc::new(OvsSwitch::new(&opts.bridge)))?;

    let mut poller = PortStatsPoller::new(opts.interval_ms);
    poller.run(Arc::clone(&engine));

    let listener = TcpListener::bind(opts.listen)?;
    log::info!("listening for updates on {}", opts.listen);
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                if let Err(e) = serve(&engine, &mut stream) {
                    log::debug!("update connection closed: {}", e);
                }
            }
            Err(e) => log::warn!("accept failed: {}", e),
        }
    }

    unreachable!("listener.incoming() never returns None");
}

/// Applies update messages from one connection until it closes. A rejected
/// update is logged and does not end the connection.
fn serve(engine: &Arc<Dtm>, stream: &mut TcpStream) -> Result<()> {
    if let Ok(peer) = stream.peer_addr() {
        log::info!("update connection from {}", peer);
    }
    loop {
        let msg = message::recv_message(stream)?;
        let result = match msg {
            Message::Config(config) => engine.set_config(config),
            Message::Reference(vector) => engine.set_reference(Some(&vector)),
            Message::Compensation(vector) => engine.set_compensation(Some(&vector)),
        };
        match result {
            Ok(()) => refresh_proactive_rules(engine),
            Err(e) => log::warn!("update rejected: {}", e),
        }
    }
}

/// In proactive modes every accepted update may shift the bulk decision;
/// recompute it and log what a rule installer would now push down.
fn refresh_proactive_rules(engine: &Arc<Dtm>) {
    match engine.decide_all() {
        Ok(decisions) => {
            for (prefix, port) in decisions {
                log::info!("proactive rule: {} via port {}", prefix, port);
            }
        }
        Err(dtm::Error::IllegalState(_)) => {} // reactive mode, nothing to push
        Err(e) => log::warn!("bulk decision failed: {}", e),
    }
}
