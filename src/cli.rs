use clap::Parser;
use std::path::PathBuf;

/// 可续传的并发 HTTP 下载工具
#[derive(Parser, Debug)]
#[command(name = "rangefetch")]
#[command(version)]
#[command(about = "并发下载多个远程文件，支持 Ctrl-C 取消", long_about = None)]
pub struct Cli {
    /// 文件链接，可以指定多个
    #[arg(value_name = "URL", required = true)]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub urls: Vec<String>,

    /// 文件保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(default_value = ".")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// JSON 配置文件 (可选)
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// 连接超时秒数，覆盖配置文件
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}
