use imgbatch_core::api::{plan, AppConfig, CliError, GroupPlan, Pipeline};
use serde_json::json;

use super::cli::PlanArgs;
use super::{group_selection, select_pipelines};

pub fn handle_plan(args: PlanArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let groups = group_selection(&args.select.groups);
    for pcfg in select_pipelines(cfg, &args.select.pipelines)? {
        let pipeline = Pipeline::from_config(pcfg)?;
        let plans = plan(&pipeline, groups)?;
        match args.format.as_str() {
            "jsonl" => {
                for p in &plans {
                    println!("{}", plan_json(&pipeline.name, p));
                }
            }
            _ => print!("{}", plan_text(&pipeline, &plans, args.verbose)),
        }
    }
    Ok(0)
}

fn plan_text(pipeline: &Pipeline, plans: &[GroupPlan], verbose: bool) -> String {
    let mut out = format!(
        "PIPELINE {} ({} -> {})\n",
        pipeline.name,
        pipeline.input_root.display(),
        pipeline.output_root.display()
    );
    let mut to_do = 0;
    for p in plans {
        match &p.residual {
            Ok(r) => {
                to_do += r.pending.len();
                out.push_str(&format!(
                    "  {}: {} done, {} to do",
                    p.group_id,
                    r.already_done,
                    r.pending.len()
                ));
                if !r.collisions.is_empty() {
                    out.push_str(&format!(", {} name collisions", r.collisions.len()));
                }
                out.push('\n');
                if verbose {
                    for item in &r.pending {
                        out.push_str(&format!(
                            "    {} -> {}\n",
                            item.input_path.display(),
                            item.output_name
                        ));
                    }
                }
            }
            Err(e) => out.push_str(&format!("  {}: cannot enumerate: {e}\n", p.group_id)),
        }
    }
    out.push_str(&format!("  total to do: {to_do}\n"));
    out
}

fn plan_json(pipeline: &str, p: &GroupPlan) -> serde_json::Value {
    match &p.residual {
        Ok(r) => json!({
            "pipeline": pipeline,
            "group_id": p.group_id,
            "already_done": r.already_done,
            "to_do": r.pending.len(),
            "pending": r.pending.iter().map(|i| i.input_path.display().to_string()).collect::<Vec<_>>(),
            "collisions": r.collisions.iter().map(|c| json!({
                "output_name": c.output_name,
                "inputs": c.inputs.iter().map(|i| i.display().to_string()).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        }),
        Err(e) => json!({
            "pipeline": pipeline,
            "group_id": p.group_id,
            "error": e.to_string(),
        }),
    }
}
