//! Chain assembly
//!
//! The initial chain is put together in two halves. The input half is
//! built at track creation from the operation kind and the source locator
//! (extension→decoder resolution happens here, so an unknown format fails
//! before the track ever becomes live). The output half is appended at
//! start time, when the control values that shape it ("output" target,
//! levels, stream-copy) have settled.
//!
//! A typical playback chain:
//!   queue.track -> file.read -> DECODER -> sound.until -> UI
//!   -> sound.gain -> sound.autoconv -> OUTPUT

use std::path::Path;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::filter::InsertPos;
use crate::modules::ModuleResolver;
use crate::store::Value;
use crate::types::{Direction, TrackType};

use super::Track;

impl Track {
    /// Resolve `name` and append it to the chain
    fn add(&mut self, resolver: &dyn ModuleResolver, name: &str) -> EngineResult<()> {
        let factory = resolver
            .by_name(name)
            .ok_or_else(|| EngineError::UnknownModule(name.to_string()))?;
        let at = self.chain.insert(InsertPos::Last, Arc::from(name), factory)?;
        log::debug!(
            "{}: added {} to chain [{}]",
            self.info.id,
            name,
            self.chain.print(Some(at))
        );
        Ok(())
    }

    /// Resolve a codec module from a file extension and append it
    fn add_by_ext(
        &mut self,
        resolver: &dyn ModuleResolver,
        ext: &str,
        dir: Direction,
    ) -> EngineResult<()> {
        let (name, factory) = resolver.by_extension(ext, dir).ok_or_else(|| {
            EngineError::UnknownExtension {
                ext: ext.to_string(),
                direction: dir,
            }
        })?;
        let at = self.chain.insert(InsertPos::Last, Arc::clone(&name), factory)?;
        log::debug!(
            "{}: added {} to chain [{}]",
            self.info.id,
            name,
            self.chain.print(Some(at))
        );
        Ok(())
    }

    /// Build the input half of the chain at creation time
    pub(crate) fn build_input(
        &mut self,
        resolver: &dyn ModuleResolver,
        config: &EngineConfig,
        url: Option<&str>,
    ) -> EngineResult<()> {
        match self.info.params.ty {
            TrackType::Playback | TrackType::Convert | TrackType::PeakScan => {
                let url = url.ok_or(EngineError::NoSource)?;
                let _ = self.info.dict.set("input", Value::str(url), false);
                self.add(resolver, "queue.track")?;
                self.build_source(resolver, url)
            }
            TrackType::Record => {
                let capture = config
                    .capture_module
                    .as_deref()
                    .ok_or(EngineError::NoCaptureModule)?;
                self.add(resolver, capture)?;
                self.add(resolver, "sound.until")?;
                self.add(resolver, "sound.rtpeak")
            }
            TrackType::MixOut => {
                self.add(resolver, "queue.track")?;
                self.add(resolver, "mix.out")
            }
            // mix-in sources are inserted dynamically by the mixer
            TrackType::MixIn => Ok(()),
        }
    }

    /// Pick the source reader and decoder for a file-based track
    fn build_source(&mut self, resolver: &dyn ModuleResolver, url: &str) -> EngineResult<()> {
        if Path::new(url).is_dir() {
            return self.add(resolver, "playlist.dir");
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            return self.add(resolver, "net.stream");
        }

        if url == "@stdin" {
            self.add(resolver, "file.stdin")?;
        } else {
            self.add(resolver, "file.read")?;
        }

        // an explicit "input_format" wins over the file extension
        let ext = match self.info.dict.get_str("input_format") {
            Some(fmt) => fmt.to_string(),
            None => Path::new(url)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_string)
                .ok_or_else(|| EngineError::NoExtension(url.to_string()))?,
        };
        self.add_by_ext(resolver, &ext, Direction::Input)
    }

    /// Append the output half of the chain at start time
    pub(crate) fn build_output(
        &mut self,
        resolver: &dyn ModuleResolver,
        config: &EngineConfig,
    ) -> EngineResult<()> {
        let ty = self.info.params.ty;

        if ty != TrackType::MixIn {
            if ty != TrackType::Record {
                self.add(resolver, "sound.until")?;
            }
            if let Some(ui) = config.ui_module.clone() {
                self.add(resolver, &ui)?;
            }
        }

        if self.info.params.start_level_db.is_some() {
            self.add(resolver, "sound.startlevel")?;
        }
        if self.info.params.stop_level_db.is_some() {
            self.add(resolver, "sound.stoplevel")?;
        }
        if ty == TrackType::Record && self.info.params.prebuffer_msec.is_some() {
            self.add(resolver, "sound.membuf")?;
        }

        if ty != TrackType::MixOut && !self.info.params.stream_copy {
            self.add(resolver, "sound.gain")?;
        }
        if self.info.params.use_auto_norm {
            self.add(resolver, "sound.autonorm")?;
        }
        self.add(resolver, "sound.autoconv")?;

        if ty == TrackType::MixIn {
            return self.add(resolver, "mix.in");
        }
        if ty == TrackType::PeakScan {
            return self.add(resolver, "sound.peaks");
        }

        if let Some(out) = self.info.dict.get_str("output").map(str::to_string) {
            let path = Path::new(&out);
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .ok_or_else(|| EngineError::NoExtension(out.clone()))?;
            self.add_by_ext(resolver, ext, Direction::Output)?;

            let to_stdout = path.file_stem().and_then(|s| s.to_str()) == Some("@stdout");
            if to_stdout {
                self.add(resolver, "file.stdout")?;
                self.info.params.out_seekable = false;
            } else {
                self.add(resolver, "file.write")?;
                self.info.params.out_seekable = true;
            }
            return Ok(());
        }

        if ty == TrackType::Convert {
            return Err(EngineError::NoOutput);
        }
        if let Some(out) = config.default_output.clone() {
            self.add(resolver, &out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterFactory, Open, StageResult};
    use crate::info::TrackInfo;
    use crate::modules::ModuleMap;

    struct Passthrough;
    impl Filter for Passthrough {
        fn process(&mut self, _ti: &mut TrackInfo) -> StageResult {
            StageResult::Done
        }
    }

    struct PassFactory;
    impl FilterFactory for PassFactory {
        fn open(&self, _ti: &mut TrackInfo) -> Result<Open, String> {
            Ok(Open::Ready(Box::new(Passthrough)))
        }
    }

    fn resolver() -> ModuleMap {
        let mut map = ModuleMap::new();
        for name in [
            "queue.track",
            "file.read",
            "file.stdin",
            "file.write",
            "file.stdout",
            "playlist.dir",
            "net.stream",
            "sound.until",
            "sound.gain",
            "sound.autoconv",
            "sound.peaks",
            "sound.rtpeak",
            "sound.membuf",
            "mix.in",
            "mix.out",
            "fmt.flac",
            "fmt.wav",
            "tui.progress",
            "audio.out",
            "audio.in",
        ] {
            map.register(name, Arc::new(PassFactory));
        }
        map.register_ext("flac", Direction::Input, "fmt.flac");
        map.register_ext("wav", Direction::Output, "fmt.wav");
        map
    }

    fn config() -> EngineConfig {
        EngineConfig {
            ui_module: Some("tui.progress".to_string()),
            default_output: Some("audio.out".to_string()),
            capture_module: Some("audio.in".to_string()),
            print_time: false,
        }
    }

    #[test]
    fn test_playback_chain() {
        let map = resolver();
        let mut track = Track::new(1, TrackType::Playback, None);
        track
            .build_input(&map, &config(), Some("/music/a.flac"))
            .unwrap();
        track.build_output(&map, &config()).unwrap();

        assert_eq!(
            track.chain.print(None),
            "queue.track -> file.read -> fmt.flac -> sound.until -> tui.progress \
             -> sound.gain -> sound.autoconv -> audio.out"
        );
    }

    #[test]
    fn test_convert_chain() {
        let map = resolver();
        let mut track = Track::new(2, TrackType::Convert, None);
        track
            .build_input(&map, &config(), Some("/music/a.flac"))
            .unwrap();
        track
            .info
            .dict
            .set("output", Value::str("/tmp/out.wav"), false)
            .unwrap();
        track.build_output(&map, &config()).unwrap();

        assert!(track.info.params.out_seekable);
        assert_eq!(
            track.chain.print(None),
            "queue.track -> file.read -> fmt.flac -> sound.until -> tui.progress \
             -> sound.gain -> sound.autoconv -> fmt.wav -> file.write"
        );
    }

    #[test]
    fn test_record_chain() {
        let map = resolver();
        let mut track = Track::new(3, TrackType::Record, None);
        track.info.params.prebuffer_msec = Some(1000);
        track.build_input(&map, &config(), None).unwrap();
        track
            .info
            .dict
            .set("output", Value::str("/tmp/take.wav"), false)
            .unwrap();
        track.build_output(&map, &config()).unwrap();

        // no sound.until in the output half for record tracks
        assert_eq!(
            track.chain.print(None),
            "audio.in -> sound.until -> sound.rtpeak -> tui.progress -> sound.membuf \
             -> sound.gain -> sound.autoconv -> fmt.wav -> file.write"
        );
    }

    #[test]
    fn test_unknown_extension_fails_construction() {
        let map = resolver();
        let mut track = Track::new(4, TrackType::Playback, None);
        let err = track
            .build_input(&map, &config(), Some("/music/a.xyz"))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownExtension { .. }));
    }

    #[test]
    fn test_convert_without_output_fails() {
        let map = resolver();
        let mut track = Track::new(5, TrackType::Convert, None);
        track
            .build_input(&map, &config(), Some("/music/a.flac"))
            .unwrap();
        let err = track.build_output(&map, &config()).unwrap_err();
        assert!(matches!(err, EngineError::NoOutput));
    }

    #[test]
    fn test_stdout_output_not_seekable() {
        let map = resolver();
        let mut track = Track::new(6, TrackType::Convert, None);
        track
            .build_input(&map, &config(), Some("/music/a.flac"))
            .unwrap();
        track
            .info
            .dict
            .set("output", Value::str("@stdout.wav"), false)
            .unwrap();
        track.build_output(&map, &config()).unwrap();
        assert!(!track.info.params.out_seekable);
        assert!(track.chain.print(None).ends_with("fmt.wav -> file.stdout"));
    }
}
