// ==========================================
// 计量计价导入 - 命令行入口
// ==========================================
// 用法:
//   estimate-import <file> [estimate_id]
//
// 配置: ESTIMATE_IMPORT_CONFIG 指向 JSON 配置文件（可选）,
//       ESTIMATE_IMPORT_* 环境变量覆写单项
// 输出: 导入结果 JSON 写到 stdout,日志写到 stderr
// 退出码: 0 成功 / 1 导入失败 / 2 需要指定方案
// ==========================================

use estimate_importer::config::ConfigManager;
use estimate_importer::importer::{
    EstimateImporter, EstimateImporterImpl, ImportError, ImportOptions,
};
use estimate_importer::logging;
use std::path::PathBuf;
use std::process::ExitCode;

const CONFIG_PATH_ENV: &str = "ESTIMATE_IMPORT_CONFIG";

fn load_config() -> anyhow::Result<ConfigManager> {
    let manager = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => ConfigManager::from_json_file(path.trim())?,
        _ => ConfigManager::new(),
    };
    Ok(manager.with_env_overrides())
}

fn run(path: PathBuf, options: ImportOptions) -> anyhow::Result<ExitCode> {
    let config = load_config()?;
    let importer = EstimateImporterImpl::new(config);

    match importer.import_file(&path, &options) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(ImportError::AmbiguousEstimateSelection { available }) => {
            eprintln!("文档包含多个预算方案,请指定 estimate_id:");
            for choice in &available {
                eprintln!("  {}\t{}", choice.id, choice.label.as_deref().unwrap_or("-"));
            }
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> ExitCode {
    logging::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next().map(PathBuf::from) else {
        eprintln!("用法: estimate-import <file> [estimate_id]");
        return ExitCode::from(1);
    };
    let options = match args.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        Some(id) => ImportOptions::with_estimate(id),
        None => ImportOptions::default(),
    };

    tracing::info!(version = estimate_importer::VERSION, file = %path.display(), "启动导入");

    match run(path, options) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("导入失败: {}", e);
            ExitCode::from(1)
        }
    }
}
