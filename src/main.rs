// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! `mind-loops`: build sample while loops (and their gradients), then run
//! them through the reference interpreter.

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};

use mind_loops::eval::{format_value_human, ExecOptions, Executor};
use mind_loops::graph::{format_graph, verify_graph, Graph, Output, Scope};
use mind_loops::ops::{self, build_while_loop};

#[derive(Parser, Debug)]
#[command(name = "mind-loops", version, about = "Build and run MIND while loops")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Abort a run once any loop frame exceeds this many iterations.
    #[arg(long, default_value_t = ExecOptions::default().max_iterations, global = true)]
    max_iterations: usize,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count from 0 up to N with a while loop.
    Count {
        #[arg(long, default_value_t = 5)]
        iterations: i64,
        /// Dump the constructed graph before running it.
        #[arg(long, action = ArgAction::SetTrue)]
        print_graph: bool,
    },
    /// Differentiate `x *= factor`, repeated M times, with respect to x.
    #[cfg(feature = "autodiff")]
    Grad {
        #[arg(long, default_value_t = 3)]
        iterations: i64,
        #[arg(long, default_value_t = 2.0)]
        factor: f64,
        /// Dump the constructed graph before running it.
        #[arg(long, action = ArgAction::SetTrue)]
        print_graph: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    stderrlog::new()
        .module("mind_loops")
        .verbosity(usize::from(cli.verbose) + 1)
        .init()
        .context("failed to initialise logging")?;

    let options = ExecOptions {
        max_iterations: cli.max_iterations,
    };
    match cli.command {
        Command::Count {
            iterations,
            print_graph,
        } => run_count(iterations, print_graph, options),
        #[cfg(feature = "autodiff")]
        Command::Grad {
            iterations,
            factor,
            print_graph,
        } => run_grad(iterations, factor, print_graph, options),
    }
}

fn run_count(iterations: i64, print_graph: bool, options: ExecOptions) -> anyhow::Result<()> {
    let mut graph = Graph::new();
    let root = Scope::root();
    let zero = ops::const_i32(&mut graph, &root, 0)?;
    let out = build_while_loop(
        &mut graph,
        &root.new_sub_scope("count"),
        &[zero],
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let limit = ops::const_i32(g, s, iterations)?;
            ops::less(g, s, xs[0], limit)
        },
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let one = ops::const_i32(g, s, 1)?;
            Ok(vec![ops::add(g, s, xs[0], one)?])
        },
        "count",
        false,
    )?;
    finish(&graph, &out.outputs, print_graph, options, "count")
}

#[cfg(feature = "autodiff")]
fn run_grad(
    iterations: i64,
    factor: f64,
    print_graph: bool,
    options: ExecOptions,
) -> anyhow::Result<()> {
    use mind_loops::autodiff::add_while_loop_gradient;
    use mind_loops::graph::GraphError;

    let mut graph = Graph::new();
    let root = Scope::root();
    let i0 = ops::const_i32(&mut graph, &root, 0)?;
    let x0 = ops::const_f32(&mut graph, &root, 1.0)?;
    let forward = build_while_loop::<_, _, GraphError>(
        &mut graph,
        &root.new_sub_scope("scale"),
        &[i0, x0],
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let limit = ops::const_i32(g, s, iterations)?;
            ops::less(g, s, xs[0], limit)
        },
        |g: &mut Graph, s: &Scope, xs: &[Output]| {
            let one = ops::const_i32(g, s, 1)?;
            let f = ops::const_f32(g, s, factor)?;
            Ok(vec![ops::add(g, s, xs[0], one)?, ops::mul(g, s, xs[1], f)?])
        },
        "scale",
        true,
    )?;
    let (ctx, _) = graph
        .while_context_for(forward.outputs[0])
        .context("forward loop has no while context")?;

    let di = ops::const_i32(&mut graph, &root, 0)?;
    let dx = ops::const_f32(&mut graph, &root, 1.0)?;
    let grads = add_while_loop_gradient(&mut graph, ctx, &[di, dx], &root)?;

    let fetches = [forward.outputs[1], grads[1]];
    finish(&graph, &fetches, print_graph, options, "x_final, dx_final/dx_0")
}

fn finish(
    graph: &Graph,
    fetches: &[Output],
    print_graph: bool,
    options: ExecOptions,
    label: &str,
) -> anyhow::Result<()> {
    verify_graph(graph)?;
    if print_graph {
        print!("{}", format_graph(graph));
    }
    let values = Executor::new(graph).with_options(options).run(fetches)?;
    let rendered: Vec<String> = values.iter().map(format_value_human).collect();
    println!("{label} = {}", rendered.join(", "));
    Ok(())
}
