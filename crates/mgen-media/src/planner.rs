//! Composition planning.
//!
//! Turns an ordered scene list into an FFmpeg filter graph. Planning is
//! pure: no files are touched and no process is started.
//!
//! Timeline arithmetic: with `C(i)` the summed duration of scenes `0..i`,
//! the transition into scene `i` has length `d = min(configured,
//! dur(i-1), dur(i))` and starts at `C(i) - d`. Each still image is looped
//! for its own duration plus the length of its incoming transition, so the
//! joined stream is exactly `C(n)` long.

use std::path::{Path, PathBuf};

use mgen_models::{EncodingConfig, Scene, SubtitlePosition, SubtitleStyle, TransitionKind};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Label of the final video stream.
pub const VIDEO_LABEL: &str = "v";
/// Label of the joined audio stream.
pub const AUDIO_LABEL: &str = "a";

/// A looped still-image input.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedInput {
    pub path: PathBuf,
    /// Seconds the image is held, including transition lead-in
    pub hold: f64,
}

/// A timed transition between scene `index - 1` and scene `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOp {
    /// Incoming scene index
    pub index: usize,
    pub kind: TransitionKind,
    pub duration: f64,
    /// Start time on the output timeline
    pub offset: f64,
}

/// How two consecutive scenes are joined.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinStep {
    /// Hard cut at `at` seconds
    Cut { index: usize, at: f64 },
    Transition(TransitionOp),
}

/// Narration tracks laid under the video.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMux {
    pub tracks: Vec<PathBuf>,
    /// FFmpeg input index of the first track
    pub first_input: usize,
}

impl AudioMux {
    /// Stream specifier to pass to `-map`.
    pub fn map_spec(&self) -> String {
        if self.tracks.len() == 1 {
            format!("{}:a", self.first_input)
        } else {
            format!("[{}]", AUDIO_LABEL)
        }
    }

    fn filter(&self) -> Option<String> {
        if self.tracks.len() < 2 {
            return None;
        }
        let labels: String = (0..self.tracks.len())
            .map(|i| format!("[{}:a]", self.first_input + i))
            .collect();
        Some(format!(
            "{}concat=n={}:v=0:a=1[{}]",
            labels,
            self.tracks.len(),
            AUDIO_LABEL
        ))
    }
}

/// Frame-accurate description of a composition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionPlan {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub inputs: Vec<PlannedInput>,
    /// Per-scene scale/pad/normalize chains, one per input
    pub scene_filters: Vec<String>,
    /// Joins between consecutive scenes, in timeline order
    pub joins: Vec<JoinStep>,
    pub audio: Option<AudioMux>,
    /// Output duration in seconds
    pub total_duration: f64,
}

/// Plan a composition with the default subtitle style.
pub fn plan(scenes: &[Scene], width: u32, height: u32, fps: u32) -> MediaResult<CompositionPlan> {
    plan_with_style(scenes, width, height, fps, &SubtitleStyle::default())
}

/// Plan a composition.
pub fn plan_with_style(
    scenes: &[Scene],
    width: u32,
    height: u32,
    fps: u32,
    style: &SubtitleStyle,
) -> MediaResult<CompositionPlan> {
    if scenes.is_empty() {
        return Err(MediaError::invalid_plan("no scenes to compose"));
    }
    if width == 0 || height == 0 {
        return Err(MediaError::invalid_plan(format!("invalid canvas {}x{}", width, height)));
    }
    if fps == 0 {
        return Err(MediaError::invalid_plan("fps must be positive"));
    }

    let mut paths = Vec::with_capacity(scenes.len());
    for (i, scene) in scenes.iter().enumerate() {
        if !scene.duration.is_finite() || scene.duration <= 0.0 {
            return Err(MediaError::invalid_plan(format!(
                "scene {} has invalid duration {}",
                i, scene.duration
            )));
        }
        if !scene.transition_duration.is_finite() {
            return Err(MediaError::invalid_plan(format!(
                "scene {} has invalid transition duration",
                i
            )));
        }
        let path = scene.image.as_path().ok_or_else(|| {
            MediaError::invalid_plan(format!("scene {} image is not a local file", i))
        })?;
        paths.push(path.to_path_buf());
    }

    let mut joins = Vec::with_capacity(scenes.len().saturating_sub(1));
    let mut lead_in = vec![0.0; scenes.len()];
    let mut cumulative = scenes[0].duration;

    for i in 1..scenes.len() {
        let prev = &scenes[i - 1];
        let cur = &scenes[i];
        let d = prev
            .transition_duration
            .min(prev.duration)
            .min(cur.duration);

        match prev.transition.xfade_name() {
            Some(_) if d > 0.0 => {
                lead_in[i] = d;
                joins.push(JoinStep::Transition(TransitionOp {
                    index: i,
                    kind: prev.transition,
                    duration: d,
                    offset: cumulative - d,
                }));
            }
            _ => joins.push(JoinStep::Cut {
                index: i,
                at: cumulative,
            }),
        }

        cumulative += cur.duration;
    }

    let single = scenes.len() == 1;
    let inputs: Vec<PlannedInput> = paths
        .into_iter()
        .zip(scenes.iter().zip(&lead_in))
        .map(|(path, (scene, lead))| PlannedInput {
            path,
            hold: scene.duration + lead,
        })
        .collect();

    let scene_filters = scenes
        .iter()
        .enumerate()
        .map(|(i, scene)| {
            let out = if single {
                VIDEO_LABEL.to_string()
            } else {
                format!("s{}", i)
            };
            scene_filter(i, scene, width, height, fps, style, &out)
        })
        .collect();

    Ok(CompositionPlan {
        width,
        height,
        fps,
        inputs,
        scene_filters,
        joins,
        audio: None,
        total_duration: cumulative,
    })
}

fn scene_filter(
    index: usize,
    scene: &Scene,
    width: u32,
    height: u32,
    fps: u32,
    style: &SubtitleStyle,
    out_label: &str,
) -> String {
    let mut chain = format!(
        "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,setpts=PTS-STARTPTS,fps={fps},format=yuv420p",
        i = index,
        w = width,
        h = height,
        fps = fps,
    );

    if let Some(text) = scene.subtitle.as_deref().filter(|t| !t.trim().is_empty()) {
        chain.push(',');
        chain.push_str(&drawtext(text, scene.subtitle_position, style));
    }

    chain.push_str(&format!("[{}]", out_label));
    chain
}

fn drawtext(text: &str, position: SubtitlePosition, style: &SubtitleStyle) -> String {
    let y = match position {
        SubtitlePosition::Top => style.margin.to_string(),
        SubtitlePosition::Center => "(h-text_h)/2".to_string(),
        SubtitlePosition::Bottom => format!("h-text_h-{}", style.margin),
    };
    format!(
        "drawtext=expansion=none:text={}:fontsize={}:fontcolor={}:borderw={}:bordercolor={}:x=(w-text_w)/2:y={}",
        escape_drawtext(text),
        style.font_size,
        style.font_color,
        style.outline_width,
        style.outline_color,
        y
    )
}

/// Escape text for a drawtext option inside a filter graph.
///
/// Option-level escaping first (`\ ' :`), then filtergraph-level
/// (`\ ' [ ] , ;`).
pub fn escape_drawtext(text: &str) -> String {
    let mut option_level = String::with_capacity(text.len());
    for c in text.chars().filter(|c| !c.is_control()) {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }

    let mut graph_level = String::with_capacity(option_level.len());
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(c);
    }
    graph_level
}

impl CompositionPlan {
    /// Transition operations, excluding hard cuts.
    pub fn transitions(&self) -> impl Iterator<Item = &TransitionOp> {
        self.joins.iter().filter_map(|join| match join {
            JoinStep::Transition(op) => Some(op),
            JoinStep::Cut { .. } => None,
        })
    }

    /// Lay narration tracks under the video, back to back.
    ///
    /// Tracks are neither trimmed nor looped to the video length.
    pub fn with_audio(mut self, tracks: Vec<PathBuf>) -> Self {
        self.audio = if tracks.is_empty() {
            None
        } else {
            Some(AudioMux {
                tracks,
                first_input: self.inputs.len(),
            })
        };
        self
    }

    /// Full `-filter_complex` graph.
    pub fn filter_graph(&self) -> String {
        let mut filters = self.scene_filters.clone();

        let last = self.joins.len();
        let mut current = "s0".to_string();
        for (n, join) in self.joins.iter().enumerate() {
            let out = if n + 1 == last {
                VIDEO_LABEL.to_string()
            } else {
                format!("j{}", n + 1)
            };
            let filter = match join {
                JoinStep::Cut { index, .. } => {
                    format!("[{}][s{}]concat=n=2:v=1:a=0[{}]", current, index, out)
                }
                JoinStep::Transition(op) => format!(
                    "[{}][s{}]xfade=transition={}:duration={:.3}:offset={:.3}[{}]",
                    current,
                    op.index,
                    op.kind.xfade_name().unwrap_or("fade"),
                    op.duration,
                    op.offset,
                    out
                ),
            };
            filters.push(filter);
            current = out;
        }

        if let Some(audio_filter) = self.audio.as_ref().and_then(AudioMux::filter) {
            filters.push(audio_filter);
        }

        filters.join(";")
    }

    /// Build the FFmpeg invocation rendering this plan to `output`.
    pub fn to_command(&self, output: impl AsRef<Path>, encoding: &EncodingConfig) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(output);
        for input in &self.inputs {
            cmd = cmd.looped_image(&input.path, input.hold);
        }
        if let Some(audio) = &self.audio {
            for track in &audio.tracks {
                cmd = cmd.input(track);
            }
        }

        cmd = cmd
            .filter_complex(self.filter_graph())
            .map(format!("[{}]", VIDEO_LABEL));
        if let Some(audio) = &self.audio {
            cmd = cmd.map(audio.map_spec());
        }

        cmd.output_args(encoding.to_ffmpeg_args(self.audio.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgen_models::ContentRef;

    fn scene(i: usize, duration: f64) -> Scene {
        Scene::new(ContentRef::file(format!("/tmp/scene{}.png", i)), duration)
    }

    fn scenes(durations: &[f64]) -> Vec<Scene> {
        durations.iter().enumerate().map(|(i, d)| scene(i, *d)).collect()
    }

    fn assert_offsets_valid(plan: &CompositionPlan, scenes: &[Scene]) {
        let mut previous: Option<f64> = None;
        for op in plan.transitions() {
            let cumulative: f64 = scenes[..op.index].iter().map(|s| s.duration).sum();
            assert!((op.offset - (cumulative - op.duration)).abs() < 1e-9);
            assert!(op.offset < cumulative);
            if let Some(prev) = previous {
                assert!(op.offset > prev, "offsets must strictly increase");
            }
            previous = Some(op.offset);
        }
    }

    #[test]
    fn test_three_fades_total_is_sum() {
        let scenes = scenes(&[5.0, 5.0, 5.0]);
        let plan = plan(&scenes, 1920, 1080, 30).unwrap();

        assert_eq!(plan.total_duration, 15.0);
        let offsets: Vec<f64> = plan.transitions().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![4.5, 9.5]);
        assert_offsets_valid(&plan, &scenes);

        // Lead-in keeps the joined stream at the planned length.
        let holds: Vec<f64> = plan.inputs.iter().map(|i| i.hold).collect();
        assert_eq!(holds, vec![5.0, 5.5, 5.5]);
    }

    #[test]
    fn test_single_scene_has_no_transitions() {
        let plan = plan(&scenes(&[4.0]), 1280, 720, 30).unwrap();
        assert_eq!(plan.transitions().count(), 0);
        assert!(plan.joins.is_empty());
        assert_eq!(plan.total_duration, 4.0);
        assert!(plan.filter_graph().ends_with("[v]"));
        assert!(!plan.filter_graph().contains("xfade"));
    }

    #[test]
    fn test_offsets_strictly_increase_for_mixed_lists() {
        let cases: Vec<Vec<Scene>> = vec![
            scenes(&[5.0, 0.3, 5.0]),
            scenes(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            scenes(&[0.4, 0.4, 0.4, 0.4]),
            {
                let mut s = scenes(&[5.0, 0.3, 0.3, 5.0]);
                s[0].transition = TransitionKind::None;
                s[1].transition_duration = 2.0;
                s
            },
            {
                let mut s = scenes(&[3.0, 3.0, 3.0]);
                s[0].transition = TransitionKind::Dissolve;
                s[1].transition = TransitionKind::SlideUp;
                s[1].transition_duration = 1.25;
                s
            },
        ];

        for scenes in cases {
            let plan = plan(&scenes, 640, 360, 24).unwrap();
            assert_offsets_valid(&plan, &scenes);
            let sum: f64 = scenes.iter().map(|s| s.duration).sum();
            assert!((plan.total_duration - sum).abs() < 1e-9);
        }
    }

    #[test]
    fn test_transition_clamped_to_shorter_neighbor() {
        let mut scenes = scenes(&[5.0, 0.3]);
        scenes[0].transition_duration = 1.0;
        let plan = plan(&scenes, 640, 360, 24).unwrap();
        let op = plan.transitions().next().unwrap();
        assert!((op.duration - 0.3).abs() < 1e-9);
        assert!((op.offset - 4.7).abs() < 1e-9);
    }

    #[test]
    fn test_none_transition_is_a_cut() {
        let mut scenes = scenes(&[2.0, 3.0]);
        scenes[0].transition = TransitionKind::None;
        let plan = plan(&scenes, 640, 360, 24).unwrap();

        assert_eq!(plan.transitions().count(), 0);
        assert_eq!(plan.joins, vec![JoinStep::Cut { index: 1, at: 2.0 }]);
        assert!(plan.filter_graph().contains("[s0][s1]concat=n=2:v=1:a=0[v]"));
        assert_eq!(plan.inputs[1].hold, 3.0);
    }

    #[test]
    fn test_zero_transition_duration_is_a_cut() {
        let mut scenes = scenes(&[2.0, 3.0]);
        scenes[0].transition_duration = 0.0;
        let plan = plan(&scenes, 640, 360, 24).unwrap();
        assert!(matches!(plan.joins[0], JoinStep::Cut { .. }));
    }

    #[test]
    fn test_filter_graph_shape() {
        let mut scenes = scenes(&[5.0, 5.0, 5.0]);
        scenes[1].transition = TransitionKind::Zoom;
        let graph = plan(&scenes, 1920, 1080, 30).unwrap().filter_graph();

        assert!(graph.starts_with(
            "[0:v]scale=1920:1080:force_original_aspect_ratio=decrease,pad=1920:1080:(ow-iw)/2:(oh-ih)/2"
        ));
        assert!(graph.contains("[s0][s1]xfade=transition=fade:duration=0.500:offset=4.500[j1]"));
        assert!(graph.contains("[j1][s2]xfade=transition=zoomin:duration=0.500:offset=9.500[v]"));
    }

    #[test]
    fn test_subtitle_placement() {
        let scenes = vec![
            scene(0, 2.0).with_subtitle("Hello", SubtitlePosition::Top),
            scene(1, 2.0).with_subtitle("World", SubtitlePosition::Bottom),
            scene(2, 2.0).with_subtitle("Mid", SubtitlePosition::Center),
        ];
        let plan = plan(&scenes, 640, 360, 24).unwrap();

        assert!(plan.scene_filters[0].contains("text=Hello:fontsize=48"));
        assert!(plan.scene_filters[0].contains("y=50[s0]"));
        assert!(plan.scene_filters[1].contains("y=h-text_h-50[s1]"));
        assert!(plan.scene_filters[2].contains("y=(h-text_h)/2[s2]"));
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("a:b"), "a\\\\:b");
        assert_eq!(escape_drawtext("it's"), "it\\\\\\'s");
        assert_eq!(escape_drawtext("x, [y]"), "x\\, \\[y\\]");
    }

    #[test]
    fn test_audio_mapping_uses_real_input_index() {
        let plan = plan(&scenes(&[5.0, 5.0, 5.0]), 1920, 1080, 30)
            .unwrap()
            .with_audio(vec![PathBuf::from("/tmp/n.mp3")]);
        let args = plan.to_command("/tmp/out.mp4", &EncodingConfig::default()).build_args();

        assert!(args.windows(2).any(|w| w == ["-map", "3:a"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(!args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_multiple_tracks_are_concatenated() {
        let plan = plan(&scenes(&[5.0, 5.0]), 1280, 720, 30).unwrap().with_audio(vec![
            PathBuf::from("/tmp/a.mp3"),
            PathBuf::from("/tmp/b.mp3"),
        ]);
        assert!(plan
            .filter_graph()
            .ends_with("[2:a][3:a]concat=n=2:v=0:a=1[a]"));
        assert_eq!(plan.audio.as_ref().unwrap().map_spec(), "[a]");
    }

    #[test]
    fn test_silent_render_has_no_audio_args() {
        let plan = plan(&scenes(&[5.0]), 1280, 720, 30).unwrap();
        let args = plan.to_command("/tmp/out.mp4", &EncodingConfig::default()).build_args();
        assert!(!args.contains(&"-c:a".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 1);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(plan(&[], 1920, 1080, 30).is_err());
        assert!(plan(&scenes(&[5.0]), 0, 1080, 30).is_err());
        assert!(plan(&scenes(&[5.0]), 1920, 1080, 0).is_err());
        assert!(plan(&scenes(&[5.0, 0.0]), 1920, 1080, 30).is_err());
        assert!(plan(&scenes(&[f64::NAN]), 1920, 1080, 30).is_err());

        let remote = vec![Scene::new(ContentRef::url("https://x/y.png"), 5.0)];
        assert!(matches!(
            plan(&remote, 1920, 1080, 30),
            Err(MediaError::InvalidPlan(_))
        ));
    }
}
