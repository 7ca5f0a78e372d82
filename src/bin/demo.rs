// chimera-ctl: control-plane SDK for a network-impairment emulator chassis
// Copyright (C) 2026 chimera-ctl contributors
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Interactive demo driving a [`MainController`] against a mocked chassis, for exercising the
//! reservation/flow/filter API without real hardware (no wire protocol exists to connect to).

use chimera_ctl::config::{Credentials, Product};
use chimera_ctl::MainController;
use clap::Parser;

/// Register a mock tester, reserve a module/port, and print its flow/filter state.
#[derive(Debug, Parser)]
struct Cli {
    /// Module to reserve on the mock tester.
    #[clap(long, short = 'm', default_value_t = 0)]
    module: u32,
    /// Port to reserve on the mock tester.
    #[clap(long, short = 'p', default_value_t = 0)]
    port: u32,
    /// Username attached to the reservation, for logging only.
    #[clap(long, short = 'u', default_value = "chimera-demo")]
    username: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();
    let args = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store_path = std::env::temp_dir().join("chimera-demo-testers.toml");
    let controller = MainController::new(store_path, std::sync::Arc::new(chimera_ctl::controller::MockTransportFactory))?;

    let credentials = Credentials { product: Product::Chimera, host: "127.0.0.1".into(), port: 22606, password: "demo".into() };
    let tester_id = controller.add_tester(credentials).await?;
    log::info!("registered tester {tester_id}");

    let tester = controller.use_tester(&tester_id, &args.username, true, true).await?;
    let port = tester.use_port(args.module, args.port, true).await?;

    port.flows[0].set_comment("configured by chimera-demo").await?;
    let comment = port.flows[0].get_comment().await?;
    log::info!("module {} port {} flow 0 comment: {comment}", args.module, args.port);

    for info in controller.list_testers().await {
        println!("{} -> {}:{}", info.tester_id, info.host, info.port);
    }

    Ok(())
}
