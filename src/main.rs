// Tue Jan 13 2026 - Alex

use taskflow::ui;

fn main() {
    if let Err(e) = ui::cli::run() {
        ui::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
