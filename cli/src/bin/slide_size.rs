use argh::FromArgs;
use slidegrid::pyramid::PyramidSource;
use slidegrid::tiler::DEFAULT_EMPTY_CHECK_LEVEL;
use slidegrid_cli::slide_utils::open_slide;

#[derive(FromArgs, PartialEq, Debug)]
/// Print the dimensions of a slide as width,height
struct SlideSize {
    #[argh(positional)]
    slide: String,
    /// also print the dimensions of every pyramid level the tiler builds
    #[argh(switch)]
    levels: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args: SlideSize = argh::from_env();

    let deepest_level = if args.levels { DEFAULT_EMPTY_CHECK_LEVEL } else { 0 };
    let slide = open_slide(&args.slide, deepest_level)?;
    let dimensions = slide.dimensions();
    println!("{},{}", dimensions.width, dimensions.height);
    for level in 1..slide.level_count() {
        if let Some(level_dimensions) = slide.level_dimensions(level) {
            println!("level {}: {},{}", level, level_dimensions.width, level_dimensions.height);
        }
    }
    Ok(())
}
