//! Python text run against Resolve: the preamble prepended to every script and the
//! fixed state introspection script.

/// Binds `resolve`, `pm`, `project`, `media_pool`, `timeline` and `get_clip_by_name`.
pub const PREAMBLE: &str = r#"import sys, os, json

# Setup DaVinci Resolve environment
_api = os.environ.get("RESOLVE_SCRIPT_API", "")
_modules = os.path.join(_api, "Modules")
if _modules not in sys.path:
    sys.path.append(_modules)

import DaVinciResolveScript as dvr
resolve = dvr.scriptapp("Resolve")
if not resolve:
    print("ERROR: Cannot connect to DaVinci Resolve. Is it running with Local scripting enabled?", file=sys.stderr)
    sys.exit(1)

pm = resolve.GetProjectManager()
project = pm.GetCurrentProject()
media_pool = project.GetMediaPool() if project else None
timeline = project.GetCurrentTimeline() if project else None

def get_clip_by_name(name):
    """Find a media pool clip by name, searching the root bin then its sub-bins."""
    if not media_pool:
        return None
    root = media_pool.GetRootFolder()
    if not root:
        return None
    for clip in (root.GetClipList() or []):
        if clip and clip.GetName() == name:
            return clip
    for folder in (root.GetSubFolderList() or []):
        for clip in (folder.GetClipList() or []):
            if clip and clip.GetName() == name:
                return clip
    return None

# --- User script begins below ---
"#;

/// Prints one JSON document with every top-level key present; unreadable fields are null.
pub const STATE_SCRIPT: &str = r#"import json

def _safe(fn, default=None):
    try:
        value = fn()
    except Exception:
        return default
    return default if value is None else value

def _int(value):
    try:
        return int(value)
    except (TypeError, ValueError):
        return None

def _pool_entry(clip, bin_name):
    entry = {
        "name": _safe(clip.GetName),
        "bin": bin_name,
        "file_path": None,
        "duration": None,
        "type": None,
    }
    props = _safe(clip.GetClipProperty, {})
    if isinstance(props, dict):
        entry["file_path"] = props.get("File Path")
        entry["duration"] = props.get("Duration")
        entry["type"] = props.get("Type")
    return entry

state = {
    "project": None,
    "all_timelines": [],
    "timeline": None,
    "timeline_clips": [],
    "markers": {},
    "media_pool": [],
}

if project:
    state["project"] = _safe(project.GetName)
    for index in range(1, (_safe(project.GetTimelineCount, 0) or 0) + 1):
        tl = _safe(lambda: project.GetTimelineByIndex(index))
        name = _safe(tl.GetName) if tl else None
        state["all_timelines"].append(name or f"Timeline {index}")

if timeline:
    fps = _safe(lambda: float(timeline.GetSetting("timelineFrameRate")))
    start = _safe(timeline.GetStartFrame)
    end = _safe(timeline.GetEndFrame)
    duration = end - start if start is not None and end is not None else None
    video_tracks = _int(_safe(lambda: timeline.GetTrackCount("video"), 0)) or 0
    state["timeline"] = {
        "name": _safe(timeline.GetName),
        "fps": fps,
        "start_frame": start,
        "end_frame": end,
        "duration_frames": duration,
        "duration_seconds": round(duration / fps, 2) if duration is not None and fps else None,
        "start_timecode": _safe(timeline.GetStartTimecode),
        "resolution": {
            "width": _int(_safe(lambda: timeline.GetSetting("timelineResolutionWidth"))),
            "height": _int(_safe(lambda: timeline.GetSetting("timelineResolutionHeight"))),
        },
        "video_tracks": video_tracks,
        "audio_tracks": _int(_safe(lambda: timeline.GetTrackCount("audio"), 0)) or 0,
    }

    for track in range(1, video_tracks + 1):
        for item in (_safe(lambda: timeline.GetItemListInTrack("video", track), []) or []):
            clip = {
                "name": _safe(item.GetName),
                "track": track,
                "start_frame": _safe(item.GetStart),
                "end_frame": _safe(item.GetEnd),
                "duration_frames": _safe(item.GetDuration),
                "file_path": None,
            }
            mpi = _safe(item.GetMediaPoolItem)
            if mpi:
                clip["file_path"] = _safe(lambda: mpi.GetClipProperty("File Path"))
            state["timeline_clips"].append(clip)

    markers = _safe(timeline.GetMarkers, {})
    if isinstance(markers, dict):
        state["markers"] = {str(frame): marker for frame, marker in markers.items()}

if media_pool:
    root = _safe(media_pool.GetRootFolder)
    if root:
        for clip in (_safe(root.GetClipList, []) or []):
            state["media_pool"].append(_pool_entry(clip, None))
        for folder in (_safe(root.GetSubFolderList, []) or []):
            folder_name = _safe(folder.GetName)
            for clip in (_safe(folder.GetClipList, []) or []):
                state["media_pool"].append(_pool_entry(clip, folder_name))

print(json.dumps(state, indent=2, default=str))
"#;
